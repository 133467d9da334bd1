//! User reports and moderation review.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::TransitionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReportTarget {
    User,
    Stream,
    Comment,
    Story,
}

impl ReportTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportTarget::User => "user",
            ReportTarget::Stream => "stream",
            ReportTarget::Comment => "comment",
            ReportTarget::Story => "story",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(ReportTarget::User),
            "stream" => Some(ReportTarget::Stream),
            "comment" => Some(ReportTarget::Comment),
            "story" => Some(ReportTarget::Story),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReportReason {
    Spam,
    Harassment,
    HateSpeech,
    Violence,
    Nudity,
    Scam,
    Other,
}

impl ReportReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportReason::Spam => "spam",
            ReportReason::Harassment => "harassment",
            ReportReason::HateSpeech => "hate_speech",
            ReportReason::Violence => "violence",
            ReportReason::Nudity => "nudity",
            ReportReason::Scam => "scam",
            ReportReason::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "spam" => Some(ReportReason::Spam),
            "harassment" => Some(ReportReason::Harassment),
            "hate_speech" => Some(ReportReason::HateSpeech),
            "violence" => Some(ReportReason::Violence),
            "nudity" => Some(ReportReason::Nudity),
            "scam" => Some(ReportReason::Scam),
            "other" => Some(ReportReason::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    #[default]
    Open,
    Reviewing,
    Resolved,
    Dismissed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Open => "open",
            ReportStatus::Reviewing => "reviewing",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Dismissed => "dismissed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(ReportStatus::Open),
            "reviewing" => Some(ReportStatus::Reviewing),
            "resolved" => Some(ReportStatus::Resolved),
            "dismissed" => Some(ReportStatus::Dismissed),
            _ => None,
        }
    }

    /// Open and reviewing reports block duplicates from the same reporter.
    pub fn is_open(&self) -> bool {
        matches!(self, ReportStatus::Open | ReportStatus::Reviewing)
    }

    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        use ReportStatus::*;
        matches!(
            (self, next),
            (Open, Reviewing) | (Open, Resolved) | (Open, Dismissed) | (Reviewing, Resolved) | (Reviewing, Dismissed)
        )
    }

    pub fn transition(&self, next: ReportStatus) -> Result<ReportStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError::new("report", self.as_str(), next.as_str()))
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Report {
    pub id: Uuid,
    pub reporter_id: Uuid,
    pub target_type: ReportTarget,
    pub target_id: Uuid,
    pub reason: ReportReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
pub struct CreateReportRequest {
    pub target_type: ReportTarget,
    pub target_id: Uuid,
    pub reason: ReportReason,
    #[validate(length(max = 1000))]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
pub struct ReviewReportRequest {
    pub status: ReportStatus,
    #[validate(length(max = 1000))]
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_transitions() {
        use ReportStatus::*;
        assert!(Open.can_transition_to(Reviewing));
        assert!(Open.can_transition_to(Dismissed));
        assert!(Reviewing.can_transition_to(Resolved));
        assert!(!Reviewing.can_transition_to(Open));
        assert!(!Resolved.can_transition_to(Dismissed));
        assert!(Dismissed.transition(Reviewing).is_err());
    }

    #[test]
    fn test_open_states() {
        assert!(ReportStatus::Open.is_open());
        assert!(ReportStatus::Reviewing.is_open());
        assert!(!ReportStatus::Resolved.is_open());
    }

    #[test]
    fn test_reason_roundtrip() {
        let reason: ReportReason = serde_json::from_str("\"hate_speech\"").unwrap();
        assert_eq!(reason, ReportReason::HateSpeech);
        assert_eq!(ReportReason::from_str(reason.as_str()), Some(reason));
    }
}
