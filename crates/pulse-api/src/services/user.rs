//! Lazy user provisioning from token identity.

use tracing::debug;

use pulse_db::{NewUser, UserRepository};
use pulse_models::User;

use crate::auth::AuthUser;
use crate::error::ApiResult;

/// User service.
#[derive(Clone)]
pub struct UserService {
    repo: UserRepository,
}

impl UserService {
    pub fn new(repo: UserRepository) -> Self {
        Self { repo }
    }

    /// Make sure the caller has a row, creating it on first sight.
    ///
    /// Handlers call this before writes that reference the caller by
    /// foreign key. The stored role is the one from the first token.
    pub async fn ensure(&self, user: &AuthUser) -> ApiResult<User> {
        let record = self
            .repo
            .ensure(&NewUser {
                id: user.id,
                username: &user.username,
                role: user.role,
            })
            .await?;
        if record.username != user.username {
            debug!(
                user_id = %user.id,
                token_username = %user.username,
                stored = %record.username,
                "Stored username differs from token"
            );
        }
        Ok(record)
    }

    pub fn repo(&self) -> &UserRepository {
        &self.repo
    }
}
