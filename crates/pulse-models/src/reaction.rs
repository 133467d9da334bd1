//! Reactions on streams, comments, and stories.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    Like,
    Love,
    Haha,
    Wow,
    Sad,
    Angry,
}

impl ReactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionKind::Like => "like",
            ReactionKind::Love => "love",
            ReactionKind::Haha => "haha",
            ReactionKind::Wow => "wow",
            ReactionKind::Sad => "sad",
            ReactionKind::Angry => "angry",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "like" => Some(ReactionKind::Like),
            "love" => Some(ReactionKind::Love),
            "haha" => Some(ReactionKind::Haha),
            "wow" => Some(ReactionKind::Wow),
            "sad" => Some(ReactionKind::Sad),
            "angry" => Some(ReactionKind::Angry),
            _ => None,
        }
    }
}

/// What a reaction is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReactionTarget {
    Stream,
    Comment,
    Story,
}

impl ReactionTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionTarget::Stream => "stream",
            ReactionTarget::Comment => "comment",
            ReactionTarget::Story => "story",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "stream" => Some(ReactionTarget::Stream),
            "comment" => Some(ReactionTarget::Comment),
            "story" => Some(ReactionTarget::Story),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReactRequest {
    pub target_type: ReactionTarget,
    pub target_id: Uuid,
    pub kind: ReactionKind,
}

/// Aggregated reactions on one target.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReactionSummary {
    pub target_type: ReactionTarget,
    pub target_id: Uuid,
    pub counts: BTreeMap<ReactionKind, i64>,
    pub total: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mine: Option<ReactionKind>,
}

impl ReactionSummary {
    /// Build a summary from `(kind, count)` rows, skipping unknown kinds.
    pub fn from_counts<'a>(
        target_type: ReactionTarget,
        target_id: Uuid,
        rows: impl IntoIterator<Item = (&'a str, i64)>,
        mine: Option<ReactionKind>,
    ) -> Self {
        let mut counts = BTreeMap::new();
        for (kind, count) in rows {
            if let Some(kind) = ReactionKind::from_str(kind) {
                if count > 0 {
                    *counts.entry(kind).or_insert(0) += count;
                }
            }
        }
        let total = counts.values().sum();
        Self {
            target_type,
            target_id,
            counts,
            total,
            mine,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_from_counts() {
        let id = Uuid::new_v4();
        let summary = ReactionSummary::from_counts(
            ReactionTarget::Stream,
            id,
            vec![("like", 3), ("love", 2), ("bogus", 9), ("sad", 0)],
            Some(ReactionKind::Love),
        );
        assert_eq!(summary.total, 5);
        assert_eq!(summary.counts.get(&ReactionKind::Like), Some(&3));
        assert!(!summary.counts.contains_key(&ReactionKind::Sad));
        assert_eq!(summary.mine, Some(ReactionKind::Love));
    }

    #[test]
    fn test_target_parsing() {
        assert_eq!(ReactionTarget::from_str("story"), Some(ReactionTarget::Story));
        assert_eq!(ReactionTarget::from_str("user"), None);
        assert_eq!(ReactionKind::from_str("haha"), Some(ReactionKind::Haha));
    }
}
