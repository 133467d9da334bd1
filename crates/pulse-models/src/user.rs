//! User profile models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Minimum username length.
pub const USERNAME_MIN_LEN: usize = 3;

/// Maximum username length.
pub const USERNAME_MAX_LEN: usize = 30;

/// Platform role carried in the auth token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[default]
    User,
    Moderator,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Moderator => "moderator",
            UserRole::Admin => "admin",
        }
    }

    /// Parse from string. Unknown roles fall back to `User`.
    pub fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "moderator" => UserRole::Moderator,
            "admin" => UserRole::Admin,
            _ => UserRole::User,
        }
    }

    /// Moderators and admins can review reports and remove content.
    pub fn can_moderate(&self) -> bool {
        matches!(self, UserRole::Moderator | UserRole::Admin)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A platform user.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub role: UserRole,
    pub follower_count: i64,
    pub following_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public projection of a user (no role).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub follower_count: i64,
    pub following_count: i64,
    pub created_at: DateTime<Utc>,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            bio: user.bio,
            avatar_url: user.avatar_url,
            follower_count: user.follower_count,
            following_count: user.following_count,
            created_at: user.created_at,
        }
    }
}

/// Profile update request. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, JsonSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 64))]
    pub display_name: Option<String>,
    #[validate(length(max = 500))]
    pub bio: Option<String>,
    #[validate(url, length(max = 2048))]
    pub avatar_url: Option<String>,
}

impl UpdateProfileRequest {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.bio.is_none() && self.avatar_url.is_none()
    }
}

/// Check a username against `^[A-Za-z0-9_]{3,30}$`.
pub fn is_valid_username(username: &str) -> bool {
    let len = username.chars().count();
    (USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len)
        && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_rules() {
        assert!(is_valid_username("abc"));
        assert!(is_valid_username("night_owl_42"));
        assert!(!is_valid_username("ab"));
        assert!(!is_valid_username("has space"));
        assert!(!is_valid_username("dash-name"));
        assert!(!is_valid_username(&"a".repeat(31)));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!(UserRole::from_str("ADMIN"), UserRole::Admin);
        assert_eq!(UserRole::from_str("moderator"), UserRole::Moderator);
        assert_eq!(UserRole::from_str("superuser"), UserRole::User);
        assert!(UserRole::Admin.can_moderate());
        assert!(!UserRole::User.can_moderate());
        assert!(!UserRole::Moderator.is_admin());
    }

    #[test]
    fn test_profile_update_validation() {
        let ok = UpdateProfileRequest {
            display_name: Some("Night Owl".into()),
            bio: None,
            avatar_url: Some("https://cdn.example.com/a.png".into()),
        };
        assert!(ok.validate().is_ok());

        let bad_url = UpdateProfileRequest {
            avatar_url: Some("not a url".into()),
            ..Default::default()
        };
        assert!(bad_url.validate().is_err());

        let empty_name = UpdateProfileRequest {
            display_name: Some(String::new()),
            ..Default::default()
        };
        assert!(empty_name.validate().is_err());
        assert!(UpdateProfileRequest::default().is_empty());
    }
}
