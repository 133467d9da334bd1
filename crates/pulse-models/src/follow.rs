//! Follow graph models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One edge of the follow graph, joined with the other user's name.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FollowEdge {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub followed_at: DateTime<Utc>,
}

/// Result of a follow or unfollow call.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FollowState {
    pub followee_id: Uuid,
    pub following: bool,
    /// False when the call was a no-op.
    pub changed: bool,
    pub follower_count: i64,
}
