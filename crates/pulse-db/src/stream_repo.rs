//! Streams and their comments.

use tracing::{info, instrument};
use uuid::Uuid;

use pulse_models::comment::clean_body;
use pulse_models::pagination::PageQuery;
use pulse_models::stream::normalize_tags;
use pulse_models::{Comment, CreateStreamRequest, Stream, UpdateStreamRequest};

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::rows::{CommentRow, StreamRow};

const STREAM_COLUMNS: &str = "id, owner_id, title, description, category, tags, is_live, \
     viewer_count, started_at, ended_at, created_at, updated_at";

const COMMENT_COLUMNS: &str =
    "id, stream_id, author_id, parent_id, body, is_deleted, reply_count, created_at, updated_at";

/// Who is asking to delete a comment.
#[derive(Debug, Clone, Copy)]
pub struct CommentModerator {
    pub user_id: Uuid,
    pub can_moderate: bool,
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Repository for streams and comments.
#[derive(Clone)]
pub struct StreamRepository {
    db: Database,
}

impl StreamRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // =========================================================================
    // Streams
    // =========================================================================

    pub async fn create(&self, owner_id: Uuid, request: &CreateStreamRequest) -> DbResult<Stream> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(DbError::invalid("title must not be blank"));
        }

        let row: StreamRow = sqlx::query_as(&format!(
            "INSERT INTO streams (id, owner_id, title, description, category, tags) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            STREAM_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(title)
        .bind(trimmed(request.description.as_deref()))
        .bind(trimmed(request.category.as_deref()))
        .bind(normalize_tags(&request.tags))
        .fetch_one(self.db.pool())
        .await?;

        info!(stream_id = %row.id, owner_id = %owner_id, "Stream created");
        Ok(row.into())
    }

    pub async fn get(&self, stream_id: Uuid) -> DbResult<Stream> {
        let row: Option<StreamRow> =
            sqlx::query_as(&format!("SELECT {} FROM streams WHERE id = $1", STREAM_COLUMNS))
                .bind(stream_id)
                .fetch_optional(self.db.pool())
                .await?;
        row.map(Into::into)
            .ok_or_else(|| DbError::not_found(format!("stream {}", stream_id)))
    }

    /// Update the provided fields. Owner only.
    pub async fn update(
        &self,
        owner_id: Uuid,
        stream_id: Uuid,
        request: &UpdateStreamRequest,
    ) -> DbResult<Stream> {
        let title = request.title.as_deref().map(str::trim);
        if title == Some("") {
            return Err(DbError::invalid("title must not be blank"));
        }
        let tags = request.tags.as_deref().map(normalize_tags);

        self.ensure_owner(owner_id, stream_id).await?;

        let row: StreamRow = sqlx::query_as(&format!(
            "UPDATE streams SET \
                title = COALESCE($2, title), \
                description = COALESCE($3, description), \
                category = COALESCE($4, category), \
                tags = COALESCE($5, tags), \
                updated_at = clock_timestamp() \
             WHERE id = $1 RETURNING {}",
            STREAM_COLUMNS
        ))
        .bind(stream_id)
        .bind(title)
        .bind(trimmed(request.description.as_deref()))
        .bind(trimmed(request.category.as_deref()))
        .bind(tags)
        .fetch_one(self.db.pool())
        .await?;
        Ok(row.into())
    }

    /// Mark the stream live. Owner only; already-live streams are a conflict.
    #[instrument(skip(self))]
    pub async fn go_live(&self, owner_id: Uuid, stream_id: Uuid) -> DbResult<Stream> {
        self.ensure_owner(owner_id, stream_id).await?;
        let row: Option<StreamRow> = sqlx::query_as(&format!(
            "UPDATE streams SET is_live = TRUE, viewer_count = 0, started_at = clock_timestamp(), \
             ended_at = NULL, updated_at = clock_timestamp() \
             WHERE id = $1 AND NOT is_live RETURNING {}",
            STREAM_COLUMNS
        ))
        .bind(stream_id)
        .fetch_optional(self.db.pool())
        .await?;
        row.map(Into::into)
            .ok_or_else(|| DbError::InvalidState("stream is already live".to_string()))
    }

    /// End a live stream. Owner only.
    #[instrument(skip(self))]
    pub async fn end(&self, owner_id: Uuid, stream_id: Uuid) -> DbResult<Stream> {
        self.ensure_owner(owner_id, stream_id).await?;
        let row: Option<StreamRow> = sqlx::query_as(&format!(
            "UPDATE streams SET is_live = FALSE, viewer_count = 0, ended_at = clock_timestamp(), \
             updated_at = clock_timestamp() \
             WHERE id = $1 AND is_live RETURNING {}",
            STREAM_COLUMNS
        ))
        .bind(stream_id)
        .fetch_optional(self.db.pool())
        .await?;
        row.map(Into::into)
            .ok_or_else(|| DbError::InvalidState("stream is not live".to_string()))
    }

    pub async fn list_by_owner(&self, owner_id: Uuid, page: &PageQuery) -> DbResult<Vec<Stream>> {
        let before = page.cursor().map_err(DbError::Invalid)?;
        let rows: Vec<StreamRow> = sqlx::query_as(&format!(
            "SELECT {} FROM streams WHERE owner_id = $1 \
             AND ($2::timestamptz IS NULL OR created_at < $2) \
             ORDER BY created_at DESC LIMIT $3",
            STREAM_COLUMNS
        ))
        .bind(owner_id)
        .bind(before)
        .bind(i64::from(page.limit()))
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Live streams, most watched first.
    pub async fn list_live(&self, limit: u32) -> DbResult<Vec<Stream>> {
        let rows: Vec<StreamRow> = sqlx::query_as(&format!(
            "SELECT {} FROM streams WHERE is_live \
             ORDER BY viewer_count DESC, started_at DESC LIMIT $1",
            STREAM_COLUMNS
        ))
        .bind(i64::from(limit))
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn ensure_owner(&self, user_id: Uuid, stream_id: Uuid) -> DbResult<Stream> {
        let stream = self.get(stream_id).await?;
        if stream.owner_id != user_id {
            return Err(DbError::forbidden("only the stream owner can do this"));
        }
        Ok(stream)
    }

    // =========================================================================
    // Comments
    // =========================================================================

    /// Post a comment or a one-level reply.
    #[instrument(skip(self, body))]
    pub async fn create_comment(
        &self,
        author_id: Uuid,
        stream_id: Uuid,
        body: &str,
        parent_id: Option<Uuid>,
    ) -> DbResult<Comment> {
        let body = clean_body(body).ok_or_else(|| DbError::invalid("comment body is empty or too long"))?;

        let mut tx = self.db.pool().begin().await?;

        let stream: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM streams WHERE id = $1")
            .bind(stream_id)
            .fetch_optional(&mut *tx)
            .await?;
        if stream.is_none() {
            return Err(DbError::not_found(format!("stream {}", stream_id)));
        }

        if let Some(parent_id) = parent_id {
            let parent: Option<(Uuid, Option<Uuid>, bool)> = sqlx::query_as(
                "SELECT stream_id, parent_id, is_deleted FROM comments WHERE id = $1 FOR UPDATE",
            )
            .bind(parent_id)
            .fetch_optional(&mut *tx)
            .await?;
            match parent {
                None => return Err(DbError::not_found(format!("comment {}", parent_id))),
                Some((parent_stream, _, _)) if parent_stream != stream_id => {
                    return Err(DbError::invalid("parent comment is on a different stream"));
                }
                Some((_, Some(_), _)) => {
                    return Err(DbError::invalid("replies cannot be nested"));
                }
                Some((_, None, true)) => {
                    return Err(DbError::InvalidState("parent comment was deleted".to_string()));
                }
                Some(_) => {}
            }

            sqlx::query("UPDATE comments SET reply_count = reply_count + 1 WHERE id = $1")
                .bind(parent_id)
                .execute(&mut *tx)
                .await?;
        }

        let row: CommentRow = sqlx::query_as(&format!(
            "INSERT INTO comments (id, stream_id, author_id, parent_id, body) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            COMMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(stream_id)
        .bind(author_id)
        .bind(parent_id)
        .bind(&body)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    /// Top-level comments on a stream, newest first.
    pub async fn list_comments(&self, stream_id: Uuid, page: &PageQuery) -> DbResult<Vec<Comment>> {
        let before = page.cursor().map_err(DbError::Invalid)?;
        self.get(stream_id).await?;

        let rows: Vec<CommentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM comments WHERE stream_id = $1 AND parent_id IS NULL \
             AND ($2::timestamptz IS NULL OR created_at < $2) \
             ORDER BY created_at DESC LIMIT $3",
            COMMENT_COLUMNS
        ))
        .bind(stream_id)
        .bind(before)
        .bind(i64::from(page.limit()))
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Replies to a comment, oldest first.
    pub async fn replies(&self, comment_id: Uuid) -> DbResult<Vec<Comment>> {
        self.get_comment(comment_id).await?;
        let rows: Vec<CommentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM comments WHERE parent_id = $1 ORDER BY created_at ASC",
            COMMENT_COLUMNS
        ))
        .bind(comment_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get_comment(&self, comment_id: Uuid) -> DbResult<Comment> {
        let row: Option<CommentRow> =
            sqlx::query_as(&format!("SELECT {} FROM comments WHERE id = $1", COMMENT_COLUMNS))
                .bind(comment_id)
                .fetch_optional(self.db.pool())
                .await?;
        row.map(Into::into)
            .ok_or_else(|| DbError::not_found(format!("comment {}", comment_id)))
    }

    /// Edit a comment. Author only; deleted comments cannot be edited.
    pub async fn edit_comment(&self, author_id: Uuid, comment_id: Uuid, body: &str) -> DbResult<Comment> {
        let body = clean_body(body).ok_or_else(|| DbError::invalid("comment body is empty or too long"))?;
        let comment = self.get_comment(comment_id).await?;
        if comment.author_id != author_id {
            return Err(DbError::forbidden("only the author can edit this comment"));
        }
        if comment.is_deleted {
            return Err(DbError::InvalidState("comment was deleted".to_string()));
        }

        let row: CommentRow = sqlx::query_as(&format!(
            "UPDATE comments SET body = $2, updated_at = clock_timestamp() \
             WHERE id = $1 RETURNING {}",
            COMMENT_COLUMNS
        ))
        .bind(comment_id)
        .bind(&body)
        .fetch_one(self.db.pool())
        .await?;
        Ok(row.into())
    }

    /// Soft-delete a comment: author, stream owner, or a moderator.
    #[instrument(skip(self))]
    pub async fn delete_comment(&self, actor: CommentModerator, comment_id: Uuid) -> DbResult<Comment> {
        let comment = self.get_comment(comment_id).await?;

        let allowed = actor.can_moderate
            || comment.author_id == actor.user_id
            || self.get(comment.stream_id).await?.owner_id == actor.user_id;
        if !allowed {
            return Err(DbError::forbidden("not allowed to delete this comment"));
        }
        if comment.is_deleted {
            return Ok(comment);
        }

        let row: CommentRow = sqlx::query_as(&format!(
            "UPDATE comments SET is_deleted = TRUE, body = '', updated_at = clock_timestamp() \
             WHERE id = $1 RETURNING {}",
            COMMENT_COLUMNS
        ))
        .bind(comment_id)
        .fetch_one(self.db.pool())
        .await?;

        info!(comment_id = %comment_id, by = %actor.user_id, "Comment deleted");
        Ok(row.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trimmed_drops_blank_values() {
        assert_eq!(trimmed(Some("  games ")), Some("games"));
        assert_eq!(trimmed(Some("   ")), None);
        assert_eq!(trimmed(None), None);
    }
}
