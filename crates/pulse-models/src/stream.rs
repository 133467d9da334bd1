//! Live stream models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Maximum number of tags per stream.
pub const MAX_TAGS: usize = 10;

/// Maximum tag length in characters.
pub const MAX_TAG_LENGTH: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Stream {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub is_live: bool,
    pub viewer_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
pub struct CreateStreamRequest {
    #[validate(length(min = 1, max = 140))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub category: Option<String>,
    #[serde(default)]
    #[validate(custom(function = "validate_tags"))]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, JsonSchema)]
pub struct UpdateStreamRequest {
    #[validate(length(min = 1, max = 140))]
    pub title: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub category: Option<String>,
    #[validate(custom(function = "validate_tags"))]
    pub tags: Option<Vec<String>>,
}

fn validate_tags(tags: &Vec<String>) -> Result<(), ValidationError> {
    if tags.len() > MAX_TAGS {
        return Err(ValidationError::new("too_many_tags"));
    }
    let bad = tags.iter().any(|t| {
        let len = t.trim().chars().count();
        len == 0 || len > MAX_TAG_LENGTH
    });
    if bad {
        return Err(ValidationError::new("invalid_tag"));
    }
    Ok(())
}

/// Lowercase, trim, and de-duplicate tags, keeping first-seen order.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}
