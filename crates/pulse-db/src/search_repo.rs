//! Candidate loading for search.
//!
//! Ranking happens in memory in `pulse_models::search`; this module only
//! pulls the most popular or most recent rows of each kind.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use pulse_models::search::{Candidates, StoryCandidate, StreamCandidate, UserCandidate};
use pulse_models::{EntityKind, SearchScope};

use crate::error::DbResult;
use crate::pool::Database;

#[derive(Debug, FromRow)]
struct UserCandidateRow {
    id: Uuid,
    username: String,
    display_name: String,
    avatar_url: Option<String>,
    follower_count: i64,
}

#[derive(Debug, FromRow)]
struct StreamCandidateRow {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    description: Option<String>,
    category: Option<String>,
    tags: Vec<String>,
    is_live: bool,
    viewer_count: i64,
}

#[derive(Debug, FromRow)]
struct StoryCandidateRow {
    id: Uuid,
    author_id: Uuid,
    author_username: String,
    caption: Option<String>,
    media_url: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Loads search candidates.
#[derive(Clone)]
pub struct SearchRepository {
    db: Database,
}

impl SearchRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Load up to `per_kind` candidates for every kind in `scope`.
    pub async fn candidates(&self, scope: SearchScope, per_kind: u32) -> DbResult<Candidates> {
        let mut out = Candidates::default();
        if scope.includes(EntityKind::User) {
            out.users = self.users(per_kind).await?;
        }
        if scope.includes(EntityKind::Stream) {
            out.streams = self.streams(per_kind).await?;
        }
        if scope.includes(EntityKind::Story) {
            out.stories = self.stories(per_kind).await?;
        }
        Ok(out)
    }

    async fn users(&self, limit: u32) -> DbResult<Vec<UserCandidate>> {
        let rows: Vec<UserCandidateRow> = sqlx::query_as(
            "SELECT id, username, display_name, avatar_url, follower_count FROM users \
             ORDER BY follower_count DESC, created_at DESC LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| UserCandidate {
                id: r.id,
                username: r.username,
                display_name: r.display_name,
                avatar_url: r.avatar_url,
                follower_count: r.follower_count,
            })
            .collect())
    }

    async fn streams(&self, limit: u32) -> DbResult<Vec<StreamCandidate>> {
        let rows: Vec<StreamCandidateRow> = sqlx::query_as(
            "SELECT id, owner_id, title, description, category, tags, is_live, viewer_count \
             FROM streams ORDER BY is_live DESC, viewer_count DESC, created_at DESC LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| StreamCandidate {
                id: r.id,
                owner_id: r.owner_id,
                title: r.title,
                description: r.description,
                category: r.category,
                tags: r.tags,
                is_live: r.is_live,
                viewer_count: r.viewer_count,
            })
            .collect())
    }

    async fn stories(&self, limit: u32) -> DbResult<Vec<StoryCandidate>> {
        let rows: Vec<StoryCandidateRow> = sqlx::query_as(
            "SELECT s.id, s.author_id, u.username AS author_username, s.caption, s.media_url, \
             s.created_at, s.expires_at \
             FROM stories s JOIN users u ON u.id = s.author_id \
             WHERE s.expires_at > clock_timestamp() \
             ORDER BY s.created_at DESC LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| StoryCandidate {
                id: r.id,
                author_id: r.author_id,
                author_username: r.author_username,
                caption: r.caption,
                media_url: r.media_url,
                created_at: r.created_at,
                expires_at: r.expires_at,
            })
            .collect())
    }
}
