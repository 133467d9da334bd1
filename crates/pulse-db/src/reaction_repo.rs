//! Reactions on streams, comments, and stories.

use uuid::Uuid;

use pulse_models::{ReactionKind, ReactionSummary, ReactionTarget};

use crate::error::{DbError, DbResult};
use crate::pool::Database;

/// Existence check for a reaction or report target.
fn target_exists_sql(target: ReactionTarget) -> &'static str {
    match target {
        ReactionTarget::Stream => "SELECT 1 FROM streams WHERE id = $1",
        ReactionTarget::Comment => "SELECT 1 FROM comments WHERE id = $1 AND NOT is_deleted",
        ReactionTarget::Story => "SELECT 1 FROM stories WHERE id = $1 AND expires_at > clock_timestamp()",
    }
}

/// Repository for reactions.
#[derive(Clone)]
pub struct ReactionRepository {
    db: Database,
}

impl ReactionRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn ensure_target(&self, target: ReactionTarget, target_id: Uuid) -> DbResult<()> {
        let found: Option<(i32,)> = sqlx::query_as(target_exists_sql(target))
            .bind(target_id)
            .fetch_optional(self.db.pool())
            .await?;
        if found.is_none() {
            return Err(DbError::not_found(format!("{} {}", target.as_str(), target_id)));
        }
        Ok(())
    }

    /// Set the user's reaction on a target, replacing any previous kind.
    pub async fn react(
        &self,
        user_id: Uuid,
        target: ReactionTarget,
        target_id: Uuid,
        kind: ReactionKind,
    ) -> DbResult<ReactionSummary> {
        self.ensure_target(target, target_id).await?;

        sqlx::query(
            "INSERT INTO reactions (user_id, target_type, target_id, kind) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id, target_type, target_id) \
             DO UPDATE SET kind = EXCLUDED.kind, updated_at = clock_timestamp()",
        )
        .bind(user_id)
        .bind(target.as_str())
        .bind(target_id)
        .bind(kind.as_str())
        .execute(self.db.pool())
        .await?;

        self.summary(Some(user_id), target, target_id).await
    }

    /// Remove the user's reaction. Idempotent.
    pub async fn unreact(
        &self,
        user_id: Uuid,
        target: ReactionTarget,
        target_id: Uuid,
    ) -> DbResult<ReactionSummary> {
        sqlx::query("DELETE FROM reactions WHERE user_id = $1 AND target_type = $2 AND target_id = $3")
            .bind(user_id)
            .bind(target.as_str())
            .bind(target_id)
            .execute(self.db.pool())
            .await?;

        self.summary(Some(user_id), target, target_id).await
    }

    /// Counts per kind, plus the viewer's own reaction when known.
    pub async fn summary(
        &self,
        viewer: Option<Uuid>,
        target: ReactionTarget,
        target_id: Uuid,
    ) -> DbResult<ReactionSummary> {
        let counts: Vec<(String, i64)> = sqlx::query_as(
            "SELECT kind, COUNT(*) FROM reactions WHERE target_type = $1 AND target_id = $2 \
             GROUP BY kind",
        )
        .bind(target.as_str())
        .bind(target_id)
        .fetch_all(self.db.pool())
        .await?;

        let mine = match viewer {
            Some(user_id) => {
                let row: Option<(String,)> = sqlx::query_as(
                    "SELECT kind FROM reactions \
                     WHERE user_id = $1 AND target_type = $2 AND target_id = $3",
                )
                .bind(user_id)
                .bind(target.as_str())
                .bind(target_id)
                .fetch_optional(self.db.pool())
                .await?;
                row.and_then(|(kind,)| ReactionKind::from_str(&kind))
            }
            None => None,
        };

        Ok(ReactionSummary::from_counts(
            target,
            target_id,
            counts.iter().map(|(kind, count)| (kind.as_str(), *count)),
            mine,
        ))
    }
}
