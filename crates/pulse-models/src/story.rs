//! Ephemeral stories.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Default story lifetime.
pub const DEFAULT_STORY_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "image" => Some(MediaType::Image),
            "video" => Some(MediaType::Video),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Story {
    pub id: Uuid,
    pub author_id: Uuid,
    pub media_url: String,
    pub media_type: MediaType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub view_count: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Story {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Remaining fraction of the story's lifetime in `[0, 1]`.
    pub fn freshness(&self, now: DateTime<Utc>) -> f64 {
        let total = (self.expires_at - self.created_at).num_seconds();
        if total <= 0 {
            return 0.0;
        }
        let left = (self.expires_at - now).num_seconds();
        (left as f64 / total as f64).clamp(0.0, 1.0)
    }
}

/// Expiry for a story created at `created_at`.
pub fn story_expiry(created_at: DateTime<Utc>, ttl_hours: i64) -> DateTime<Utc> {
    created_at + Duration::hours(ttl_hours.max(1))
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
pub struct CreateStoryRequest {
    #[validate(url, length(max = 2048))]
    pub media_url: String,
    pub media_type: MediaType,
    #[validate(length(max = 280))]
    pub caption: Option<String>,
}

/// A story as seen in a viewer's feed.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FeedStory {
    #[serde(flatten)]
    pub story: Story,
    pub author_username: String,
    pub viewed: bool,
}

/// One viewer of a story.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StoryViewer {
    pub viewer_id: Uuid,
    pub username: String,
    pub viewed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story(created_ago_hours: i64) -> Story {
        let created_at = Utc::now() - Duration::hours(created_ago_hours);
        Story {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            media_url: "https://cdn.example.com/s.jpg".into(),
            media_type: MediaType::Image,
            caption: None,
            view_count: 0,
            expires_at: story_expiry(created_at, DEFAULT_STORY_TTL_HOURS),
            created_at,
        }
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        assert!(!story(1).is_expired(now));
        assert!(story(25).is_expired(now));
    }

    #[test]
    fn test_freshness_decays() {
        let now = Utc::now();
        let fresh = story(0).freshness(now);
        let half = story(12).freshness(now);
        let gone = story(30).freshness(now);
        assert!(fresh > 0.99);
        assert!((half - 0.5).abs() < 0.01);
        assert_eq!(gone, 0.0);
    }

    #[test]
    fn test_create_story_validation() {
        let ok = CreateStoryRequest {
            media_url: "https://cdn.example.com/v.mp4".into(),
            media_type: MediaType::Video,
            caption: Some("sunset".into()),
        };
        assert!(ok.validate().is_ok());
        let bad = CreateStoryRequest {
            caption: Some("x".repeat(281)),
            ..ok
        };
        assert!(bad.validate().is_err());
    }
}
