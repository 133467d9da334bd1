//! Users, profiles, and the follow graph.

use tracing::{debug, info, instrument};
use uuid::Uuid;

use pulse_models::pagination::PageQuery;
use pulse_models::user::is_valid_username;
use pulse_models::{FollowEdge, FollowState, UpdateProfileRequest, User, UserRole};

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::retry::with_retry;
use crate::rows::{FollowEdgeRow, UserRow};

const USER_COLUMNS: &str = "id, username, display_name, bio, avatar_url, role, \
     follower_count, following_count, created_at, updated_at";

/// Identity carried by an authenticated request.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub id: Uuid,
    pub username: &'a str,
    pub role: UserRole,
}

/// Username to store for a token-supplied name.
///
/// Falls back to `user_<id prefix>` when the token name is unusable.
pub fn initial_username(id: Uuid, requested: &str) -> String {
    if is_valid_username(requested) {
        requested.to_string()
    } else {
        format!("user_{}", &id.simple().to_string()[..8])
    }
}

/// Variant used when the preferred username is taken.
fn disambiguated_username(id: Uuid, base: &str) -> String {
    let suffix = &id.simple().to_string()[..6];
    let keep = 30 - suffix.len() - 1;
    let head: String = base.chars().take(keep).collect();
    format!("{}_{}", head, suffix)
}

/// Repository for users and follows.
#[derive(Clone)]
pub struct UserRepository {
    db: Database,
}

impl UserRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert the user if missing, then return the row.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn ensure(&self, user: &NewUser<'_>) -> DbResult<User> {
        if let Some(existing) = self.find(user.id).await? {
            return Ok(existing);
        }

        let preferred = initial_username(user.id, user.username);
        for candidate in [preferred.clone(), disambiguated_username(user.id, &preferred)] {
            let result = sqlx::query(
                "INSERT INTO users (id, username, display_name, role) VALUES ($1, $2, $2, $3) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(user.id)
            .bind(&candidate)
            .bind(user.role.as_str())
            .execute(self.db.pool())
            .await?;

            if result.rows_affected() == 1 {
                info!(username = %candidate, "Created user");
                break;
            }
            // Either a concurrent insert of the same id won, or the name is taken.
            if self.find(user.id).await?.is_some() {
                break;
            }
            debug!(username = %candidate, "Username taken, trying fallback");
        }

        self.get(user.id).await
    }

    pub async fn find(&self, id: Uuid) -> DbResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
                .bind(id)
                .fetch_optional(self.db.pool())
                .await?;
        Ok(row.map(Into::into))
    }

    pub async fn get(&self, id: Uuid) -> DbResult<User> {
        self.find(id)
            .await?
            .ok_or_else(|| DbError::not_found(format!("user {}", id)))
    }

    pub async fn exists(&self, id: Uuid) -> DbResult<bool> {
        let found: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(found.is_some())
    }

    /// Apply the provided profile fields; absent fields are left alone.
    pub async fn update_profile(&self, id: Uuid, update: &UpdateProfileRequest) -> DbResult<User> {
        let display_name = update.display_name.as_deref().map(str::trim);
        if display_name == Some("") {
            return Err(DbError::invalid("display_name must not be blank"));
        }

        let row: Option<UserRow> = sqlx::query_as(&format!(
            "UPDATE users SET \
                display_name = COALESCE($2, display_name), \
                bio = COALESCE($3, bio), \
                avatar_url = COALESCE($4, avatar_url), \
                updated_at = clock_timestamp() \
             WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(id)
        .bind(display_name)
        .bind(update.bio.as_deref())
        .bind(update.avatar_url.as_deref())
        .fetch_optional(self.db.pool())
        .await?;

        row.map(Into::into)
            .ok_or_else(|| DbError::not_found(format!("user {}", id)))
    }

    // =========================================================================
    // Follows
    // =========================================================================

    /// Follow `followee`. Counters move only when a row is inserted.
    #[instrument(skip(self))]
    pub async fn follow(&self, follower: Uuid, followee: Uuid) -> DbResult<FollowState> {
        if follower == followee {
            return Err(DbError::invalid("cannot follow yourself"));
        }

        with_retry(self.db.retry(), "follow", move || self.follow_once(follower, followee)).await
    }

    async fn follow_once(&self, follower: Uuid, followee: Uuid) -> DbResult<FollowState> {
        let mut tx = self.db.pool().begin().await?;

        let target: Option<(i64,)> =
            sqlx::query_as("SELECT follower_count FROM users WHERE id = $1")
                .bind(followee)
                .fetch_optional(&mut *tx)
                .await?;
        if target.is_none() {
            return Err(DbError::not_found(format!("user {}", followee)));
        }

        let inserted = sqlx::query(
            "INSERT INTO follows (follower_id, followee_id) VALUES ($1, $2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(follower)
        .bind(followee)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if inserted {
            bump_follow_counters(&mut tx, follower, followee, 1).await?;
        }

        let (follower_count,): (i64,) =
            sqlx::query_as("SELECT follower_count FROM users WHERE id = $1")
                .bind(followee)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;

        Ok(FollowState {
            followee_id: followee,
            following: true,
            changed: inserted,
            follower_count,
        })
    }

    /// Unfollow `followee`. Idempotent.
    #[instrument(skip(self))]
    pub async fn unfollow(&self, follower: Uuid, followee: Uuid) -> DbResult<FollowState> {
        with_retry(self.db.retry(), "unfollow", move || self.unfollow_once(follower, followee)).await
    }

    async fn unfollow_once(&self, follower: Uuid, followee: Uuid) -> DbResult<FollowState> {
        let mut tx = self.db.pool().begin().await?;

        let deleted = sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
            .bind(follower)
            .bind(followee)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            == 1;

        if deleted {
            bump_follow_counters(&mut tx, follower, followee, -1).await?;
        }

        let count: Option<(i64,)> =
            sqlx::query_as("SELECT follower_count FROM users WHERE id = $1")
                .bind(followee)
                .fetch_optional(&mut *tx)
                .await?;

        tx.commit().await?;

        Ok(FollowState {
            followee_id: followee,
            following: false,
            changed: deleted,
            follower_count: count.map(|(c,)| c).unwrap_or(0),
        })
    }

    pub async fn is_following(&self, follower: Uuid, followee: Uuid) -> DbResult<bool> {
        let found: Option<(i32,)> =
            sqlx::query_as("SELECT 1 FROM follows WHERE follower_id = $1 AND followee_id = $2")
                .bind(follower)
                .bind(followee)
                .fetch_optional(self.db.pool())
                .await?;
        Ok(found.is_some())
    }

    /// Users following `user_id`, newest first.
    pub async fn followers(&self, user_id: Uuid, page: &PageQuery) -> DbResult<Vec<FollowEdge>> {
        self.follow_edges(
            "SELECT u.id AS user_id, u.username, u.display_name, f.created_at AS followed_at \
             FROM follows f JOIN users u ON u.id = f.follower_id \
             WHERE f.followee_id = $1 AND ($2::timestamptz IS NULL OR f.created_at < $2) \
             ORDER BY f.created_at DESC LIMIT $3",
            user_id,
            page,
        )
        .await
    }

    /// Users `user_id` follows, newest first.
    pub async fn following(&self, user_id: Uuid, page: &PageQuery) -> DbResult<Vec<FollowEdge>> {
        self.follow_edges(
            "SELECT u.id AS user_id, u.username, u.display_name, f.created_at AS followed_at \
             FROM follows f JOIN users u ON u.id = f.followee_id \
             WHERE f.follower_id = $1 AND ($2::timestamptz IS NULL OR f.created_at < $2) \
             ORDER BY f.created_at DESC LIMIT $3",
            user_id,
            page,
        )
        .await
    }

    async fn follow_edges(
        &self,
        sql: &str,
        user_id: Uuid,
        page: &PageQuery,
    ) -> DbResult<Vec<FollowEdge>> {
        let before = page.cursor().map_err(DbError::Invalid)?;
        let rows: Vec<FollowEdgeRow> = sqlx::query_as(sql)
            .bind(user_id)
            .bind(before)
            .bind(i64::from(page.limit()))
            .fetch_all(self.db.pool())
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

/// Counter columns to touch, ordered by user id.
fn counter_updates(follower: Uuid, followee: Uuid) -> [(Uuid, &'static str); 2] {
    let mut updates = [(follower, "following_count"), (followee, "follower_count")];
    updates.sort_by_key(|(id, _)| *id);
    updates
}

/// Move both follow counters. Rows are updated in ascending id order, the
/// same order `ledger::lock_pair` uses, so A->B and B->A cannot deadlock.
async fn bump_follow_counters(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    follower: Uuid,
    followee: Uuid,
    delta: i64,
) -> DbResult<()> {
    for (id, column) in counter_updates(follower, followee) {
        // GREATEST keeps a drifted counter from going negative.
        sqlx::query(&format!(
            "UPDATE users SET {column} = GREATEST({column} + $2, 0), \
             updated_at = clock_timestamp() WHERE id = $1"
        ))
        .bind(id)
        .bind(delta)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_username_keeps_valid_names() {
        let id = Uuid::new_v4();
        assert_eq!(initial_username(id, "night_owl"), "night_owl");
    }

    #[test]
    fn test_initial_username_replaces_invalid_names() {
        let id = Uuid::from_u128(0xabcdef12_3456_7890_abcd_ef1234567890);
        assert_eq!(initial_username(id, "a b"), "user_abcdef12");
        assert_eq!(initial_username(id, ""), "user_abcdef12");
    }

    #[test]
    fn test_disambiguated_username_fits_limit() {
        let id = Uuid::new_v4();
        let name = disambiguated_username(id, &"x".repeat(30));
        assert!(is_valid_username(&name));
        assert_eq!(name.chars().count(), 30);
    }

    #[test]
    fn test_counter_updates_ordered_by_id() {
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);

        let forward = counter_updates(low, high);
        let backward = counter_updates(high, low);

        assert_eq!(forward, [(low, "following_count"), (high, "follower_count")]);
        assert_eq!(backward, [(low, "follower_count"), (high, "following_count")]);
        assert_eq!(forward[0].0, backward[0].0);
    }
}
