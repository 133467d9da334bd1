//! Ephemeral stories and their viewers.

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use pulse_models::story::story_expiry;
use pulse_models::{CreateStoryRequest, FeedStory, Story, StoryViewer};

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::rows::{convert_all, FeedStoryRow, StoryRow, StoryViewerRow};

const STORY_COLUMNS: &str =
    "s.id, s.author_id, s.media_url, s.media_type, s.caption, s.view_count, s.expires_at, s.created_at";

/// Repository for stories.
#[derive(Clone)]
pub struct StoryRepository {
    db: Database,
    ttl_hours: i64,
}

impl StoryRepository {
    pub fn new(db: Database, ttl_hours: i64) -> Self {
        Self { db, ttl_hours }
    }

    pub async fn create(&self, author_id: Uuid, request: &CreateStoryRequest) -> DbResult<Story> {
        let now = Utc::now();
        let caption = request
            .caption
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());

        let row: StoryRow = sqlx::query_as(&format!(
            "INSERT INTO stories AS s (id, author_id, media_url, media_type, caption, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            STORY_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(author_id)
        .bind(&request.media_url)
        .bind(request.media_type.as_str())
        .bind(caption)
        .bind(story_expiry(now, self.ttl_hours))
        .bind(now)
        .fetch_one(self.db.pool())
        .await?;

        info!(story_id = %row.id, author_id = %author_id, "Story posted");
        row.try_into()
    }

    /// Unexpired story by id.
    pub async fn get(&self, story_id: Uuid) -> DbResult<Story> {
        let row: Option<StoryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM stories s WHERE s.id = $1 AND s.expires_at > clock_timestamp()",
            STORY_COLUMNS
        ))
        .bind(story_id)
        .fetch_optional(self.db.pool())
        .await?;
        row.ok_or_else(|| DbError::not_found(format!("story {}", story_id)))?
            .try_into()
    }

    /// Unexpired stories from followed users and the viewer, grouped by
    /// author and oldest first within each author.
    pub async fn feed(&self, viewer_id: Uuid) -> DbResult<Vec<FeedStory>> {
        let rows: Vec<FeedStoryRow> = sqlx::query_as(&format!(
            "SELECT {}, u.username AS author_username, \
                    EXISTS (SELECT 1 FROM story_views v WHERE v.story_id = s.id AND v.viewer_id = $1) AS viewed \
             FROM stories s JOIN users u ON u.id = s.author_id \
             WHERE s.expires_at > clock_timestamp() \
               AND (s.author_id = $1 OR s.author_id IN \
                    (SELECT followee_id FROM follows WHERE follower_id = $1)) \
             ORDER BY (s.author_id <> $1), u.username, s.author_id, s.created_at ASC",
            STORY_COLUMNS
        ))
        .bind(viewer_id)
        .fetch_all(self.db.pool())
        .await?;
        convert_all(rows)
    }

    /// Unexpired stories by one author, oldest first.
    pub async fn list_by_author(&self, author_id: Uuid) -> DbResult<Vec<Story>> {
        let rows: Vec<StoryRow> = sqlx::query_as(&format!(
            "SELECT {} FROM stories s WHERE s.author_id = $1 AND s.expires_at > clock_timestamp() \
             ORDER BY s.created_at ASC",
            STORY_COLUMNS
        ))
        .bind(author_id)
        .fetch_all(self.db.pool())
        .await?;
        convert_all(rows)
    }

    /// Record a view. The first view by a non-author bumps `view_count`.
    #[instrument(skip(self))]
    pub async fn view(&self, viewer_id: Uuid, story_id: Uuid) -> DbResult<Story> {
        let story = self.get(story_id).await?;
        if story.author_id == viewer_id {
            return Ok(story);
        }

        let mut tx = self.db.pool().begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO story_views (story_id, viewer_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(story_id)
        .bind(viewer_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        let story = if inserted {
            let row: StoryRow = sqlx::query_as(&format!(
                "UPDATE stories s SET view_count = view_count + 1 WHERE s.id = $1 RETURNING {}",
                STORY_COLUMNS
            ))
            .bind(story_id)
            .fetch_one(&mut *tx)
            .await?;
            row.try_into()?
        } else {
            story
        };

        tx.commit().await?;
        Ok(story)
    }

    /// Who viewed a story, newest first. Author only.
    pub async fn viewers(&self, author_id: Uuid, story_id: Uuid) -> DbResult<Vec<StoryViewer>> {
        let story = self.get(story_id).await?;
        if story.author_id != author_id {
            return Err(DbError::forbidden("only the author can see viewers"));
        }

        let rows: Vec<StoryViewerRow> = sqlx::query_as(
            "SELECT v.viewer_id, u.username, v.viewed_at FROM story_views v \
             JOIN users u ON u.id = v.viewer_id WHERE v.story_id = $1 ORDER BY v.viewed_at DESC",
        )
        .bind(story_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Delete a story. Author only.
    pub async fn delete(&self, author_id: Uuid, story_id: Uuid) -> DbResult<()> {
        let story = self.get(story_id).await?;
        if story.author_id != author_id {
            return Err(DbError::forbidden("only the author can delete this story"));
        }
        sqlx::query("DELETE FROM stories WHERE id = $1")
            .bind(story_id)
            .execute(self.db.pool())
            .await?;
        info!(story_id = %story_id, "Story deleted");
        Ok(())
    }
}
