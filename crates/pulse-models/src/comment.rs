//! Stream comments.
//!
//! Comments are one level deep: a reply must point at a top-level
//! comment on the same stream.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Maximum comment body length after trimming.
pub const MAX_COMMENT_LENGTH: usize = 2000;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Comment {
    pub id: Uuid,
    pub stream_id: Uuid,
    pub author_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    /// Empty once deleted.
    pub body: String,
    pub is_deleted: bool,
    pub reply_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 2000))]
    pub body: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
pub struct EditCommentRequest {
    #[validate(length(min = 1, max = 2000))]
    pub body: String,
}

/// Trim a comment body and reject it if nothing is left.
pub fn clean_body(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_COMMENT_LENGTH {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_body() {
        assert_eq!(clean_body("  hello  ").as_deref(), Some("hello"));
        assert_eq!(clean_body("   \n\t "), None);
        assert_eq!(clean_body(&"x".repeat(MAX_COMMENT_LENGTH + 1)), None);
    }
}
