//! Fuzzy relevance scoring for user, stream, and story search.
//!
//! Scoring is pure and runs over candidates already loaded from the
//! database. Every score lies in `[0, 1]`:
//!
//! - field match: exact `1.0`, prefix `0.9`, substring `0.75`, otherwise
//!   the best Levenshtein similarity scaled by `0.7`
//! - each entity combines its best weighted field with a small boost
//!   (followers, live status and viewers, story freshness)

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Score for an exact field match.
pub const EXACT_SCORE: f64 = 1.0;
/// Score when the field starts with the query.
pub const PREFIX_SCORE: f64 = 0.9;
/// Score when the field contains the query.
pub const SUBSTRING_SCORE: f64 = 0.75;
/// Multiplier applied to pure edit-distance similarity.
pub const FUZZY_WEIGHT: f64 = 0.7;

/// Follower/viewer count at which popularity saturates.
pub const POPULARITY_SATURATION: f64 = 1_000_000.0;

/// Default minimum score for a result to be returned.
pub const DEFAULT_MIN_SCORE: f64 = 0.35;

/// Maximum normalized query length.
pub const MAX_QUERY_LENGTH: usize = 100;

// ============================================================================
// String similarity
// ============================================================================

/// Lowercase, trim, and collapse runs of whitespace to one space.
pub fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Edit distance over Unicode scalar values.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// `1 - distance / longest`, with two empty strings fully similar.
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// Average over query tokens of the best matching field token.
fn token_similarity(query: &str, field: &str) -> f64 {
    let field_tokens: Vec<&str> = field.split(' ').filter(|t| !t.is_empty()).collect();
    let query_tokens: Vec<&str> = query.split(' ').filter(|t| !t.is_empty()).collect();
    if field_tokens.is_empty() || query_tokens.is_empty() {
        return 0.0;
    }

    let total: f64 = query_tokens
        .iter()
        .map(|qt| {
            field_tokens
                .iter()
                .map(|ft| similarity(qt, ft))
                .fold(0.0, f64::max)
        })
        .sum();

    total / query_tokens.len() as f64
}

/// Score one field against an already-normalized query.
pub fn field_score(query: &str, field: &str) -> f64 {
    let field = normalize(field);
    if query.is_empty() || field.is_empty() {
        return 0.0;
    }
    if field == query {
        EXACT_SCORE
    } else if field.starts_with(query) {
        PREFIX_SCORE
    } else if field.contains(query) {
        SUBSTRING_SCORE
    } else {
        similarity(query, &field).max(token_similarity(query, &field)) * FUZZY_WEIGHT
    }
}

fn optional_field_score(query: &str, field: Option<&str>) -> f64 {
    field.map(|f| field_score(query, f)).unwrap_or(0.0)
}

/// Log-scaled popularity in `[0, 1]`.
pub fn popularity(count: i64) -> f64 {
    if count <= 0 {
        return 0.0;
    }
    ((1.0 + count as f64).ln() / (1.0 + POPULARITY_SATURATION).ln()).min(1.0)
}

// ============================================================================
// Candidates
// ============================================================================

/// Which entities to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    #[default]
    All,
    Users,
    Streams,
    Stories,
}

impl SearchScope {
    pub fn includes(&self, kind: EntityKind) -> bool {
        match self {
            SearchScope::All => true,
            SearchScope::Users => kind == EntityKind::User,
            SearchScope::Streams => kind == EntityKind::Stream,
            SearchScope::Stories => kind == EntityKind::Story,
        }
    }
}

/// Query string for `GET /api/search`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default, rename = "type")]
    pub scope: SearchScope,
    pub limit: Option<usize>,
}

/// Default number of hits returned.
pub const DEFAULT_SEARCH_LIMIT: usize = 20;
/// Maximum number of hits returned.
pub const MAX_SEARCH_LIMIT: usize = 50;

impl SearchQuery {
    /// Normalized query text, or `None` when blank or too long.
    pub fn normalized(&self) -> Option<String> {
        let q = normalize(&self.q);
        if q.is_empty() || q.chars().count() > MAX_QUERY_LENGTH {
            None
        } else {
            Some(q)
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT)
    }
}

/// Kind of a search hit. Order doubles as the tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Stream,
    Story,
}

#[derive(Debug, Clone)]
pub struct UserCandidate {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub follower_count: i64,
}

#[derive(Debug, Clone)]
pub struct StreamCandidate {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub is_live: bool,
    pub viewer_count: i64,
}

#[derive(Debug, Clone)]
pub struct StoryCandidate {
    pub id: Uuid,
    pub author_id: Uuid,
    pub author_username: String,
    pub caption: Option<String>,
    pub media_url: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// One ranked result.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchHit {
    pub kind: EntityKind,
    pub id: Uuid,
    /// Primary display text (username, title, or caption).
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    /// Owning user for streams and stories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Uuid>,
    pub score: f64,
}

// ============================================================================
// Entity scores
// ============================================================================

pub fn score_user(query: &str, user: &UserCandidate) -> f64 {
    let text = field_score(query, &user.username).max(0.9 * field_score(query, &user.display_name));
    if text <= 0.0 {
        return 0.0;
    }
    0.9 * text + 0.1 * popularity(user.follower_count)
}

pub fn score_stream(query: &str, stream: &StreamCandidate) -> f64 {
    let best_tag = stream
        .tags
        .iter()
        .map(|t| field_score(query, t))
        .fold(0.0, f64::max);

    let text = field_score(query, &stream.title)
        .max(0.85 * best_tag)
        .max(0.8 * optional_field_score(query, stream.category.as_deref()))
        .max(0.6 * optional_field_score(query, stream.description.as_deref()));
    if text <= 0.0 {
        return 0.0;
    }

    let live = if stream.is_live { 1.0 } else { 0.0 };
    0.85 * text + 0.1 * live + 0.05 * popularity(stream.viewer_count)
}

pub fn score_story(query: &str, story: &StoryCandidate, now: DateTime<Utc>) -> f64 {
    if now >= story.expires_at {
        return 0.0;
    }
    let text = optional_field_score(query, story.caption.as_deref())
        .max(0.7 * field_score(query, &story.author_username));
    if text <= 0.0 {
        return 0.0;
    }

    let total = (story.expires_at - story.created_at).num_seconds();
    let freshness = if total > 0 {
        ((story.expires_at - now).num_seconds() as f64 / total as f64).clamp(0.0, 1.0)
    } else {
        0.0
    };
    0.9 * text + 0.1 * freshness
}

// ============================================================================
// Ranking
// ============================================================================

/// Candidates for one search call.
#[derive(Debug, Clone, Default)]
pub struct Candidates {
    pub users: Vec<UserCandidate>,
    pub streams: Vec<StreamCandidate>,
    pub stories: Vec<StoryCandidate>,
}

/// Score, filter, sort, and truncate.
///
/// `query` must already be normalized. Results scoring below
/// `min_score` are dropped; ties break by kind, then label.
pub fn rank(
    query: &str,
    candidates: &Candidates,
    now: DateTime<Utc>,
    min_score: f64,
    limit: usize,
) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = Vec::new();

    for user in &candidates.users {
        let score = score_user(query, user);
        if score >= min_score && score > 0.0 {
            hits.push(SearchHit {
                kind: EntityKind::User,
                id: user.id,
                label: user.username.clone(),
                subtitle: Some(user.display_name.clone()),
                owner_id: None,
                score,
            });
        }
    }

    for stream in &candidates.streams {
        let score = score_stream(query, stream);
        if score >= min_score && score > 0.0 {
            hits.push(SearchHit {
                kind: EntityKind::Stream,
                id: stream.id,
                label: stream.title.clone(),
                subtitle: stream.category.clone(),
                owner_id: Some(stream.owner_id),
                score,
            });
        }
    }

    for story in &candidates.stories {
        let score = score_story(query, story, now);
        if score >= min_score && score > 0.0 {
            hits.push(SearchHit {
                kind: EntityKind::Story,
                id: story.id,
                label: story
                    .caption
                    .clone()
                    .unwrap_or_else(|| story.author_username.clone()),
                subtitle: Some(story.author_username.clone()),
                owner_id: Some(story.author_id),
                score,
            });
        }
    }

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.kind.cmp(&b.kind))
            .then_with(|| a.label.cmp(&b.label))
    });
    hits.truncate(limit);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(username: &str, display_name: &str, followers: i64) -> UserCandidate {
        UserCandidate {
            id: Uuid::new_v4(),
            username: username.into(),
            display_name: display_name.into(),
            avatar_url: None,
            follower_count: followers,
        }
    }

    fn stream(title: &str, tags: &[&str], is_live: bool) -> StreamCandidate {
        StreamCandidate {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: title.into(),
            description: None,
            category: None,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            is_live,
            viewer_count: 0,
        }
    }

    fn story(caption: Option<&str>, author: &str, age_hours: i64) -> StoryCandidate {
        let created_at = Utc::now() - Duration::hours(age_hours);
        StoryCandidate {
            id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            author_username: author.into(),
            caption: caption.map(str::to_string),
            media_url: "https://cdn.example.com/s.jpg".into(),
            created_at,
            expires_at: created_at + Duration::hours(24),
        }
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Hello   World \t"), "hello world");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_levenshtein_known_values() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
        assert_eq!(levenshtein("same", "same"), 0);
        // counts characters, not bytes
        assert_eq!(levenshtein("café", "cafe"), 1);
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", "abc"), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
        assert!((similarity("jon", "john") - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_field_score_tiers() {
        assert_eq!(field_score("rust", "Rust"), EXACT_SCORE);
        assert_eq!(field_score("rust", "rustacean"), PREFIX_SCORE);
        assert_eq!(field_score("owl", "night owl"), SUBSTRING_SCORE);
        let fuzzy = field_score("jon", "john");
        assert!(fuzzy > 0.0 && fuzzy < SUBSTRING_SCORE);
        assert_eq!(field_score("rust", ""), 0.0);
        assert_eq!(field_score("", "rust"), 0.0);
    }

    #[test]
    fn test_token_similarity_helps_multiword_fields() {
        // "speedrum" is one edit away from a token in the title
        let multi = field_score("speedrum", "mario speedrun practice");
        let whole_only = similarity("speedrum", "mario speedrun practice") * FUZZY_WEIGHT;
        assert!(multi > whole_only);
    }

    #[test]
    fn test_popularity_is_log_scaled_and_capped() {
        assert_eq!(popularity(0), 0.0);
        assert!(popularity(10) < popularity(1_000));
        assert_eq!(popularity(10_000_000), 1.0);
    }

    #[test]
    fn test_user_exact_beats_fuzzy() {
        let exact = score_user("nightowl", &user("nightowl", "Night Owl", 0));
        let fuzzy = score_user("nightowl", &user("nightowk", "N", 0));
        assert!(exact > fuzzy);
        assert!(exact <= 1.0);
    }

    #[test]
    fn test_followers_break_near_ties() {
        let popular = score_user("gamer", &user("gamer", "A", 500_000));
        let quiet = score_user("gamer", &user("gamer", "B", 3));
        assert!(popular > quiet);
    }

    #[test]
    fn test_stream_live_boost_and_tags() {
        let live = score_stream("speedrun", &stream("Speedrun night", &[], true));
        let offline = score_stream("speedrun", &stream("Speedrun night", &[], false));
        assert!(live > offline);

        let by_tag = score_stream("retro", &stream("Sunday session", &["retro"], false));
        assert!(by_tag >= 0.85 * 0.85 - 1e-9);
    }

    #[test]
    fn test_story_expired_scores_zero() {
        let now = Utc::now();
        assert_eq!(score_story("beach", &story(Some("beach day"), "sam", 30), now), 0.0);
        let fresh = score_story("beach", &story(Some("beach day"), "sam", 1), now);
        let older = score_story("beach", &story(Some("beach day"), "sam", 20), now);
        assert!(fresh > older);
    }

    #[test]
    fn test_rank_orders_filters_and_truncates() {
        let candidates = Candidates {
            users: vec![user("chess_master", "Chess Master", 10), user("zzz", "Q", 0)],
            streams: vec![stream("Chess openings", &["chess"], true)],
            stories: vec![story(Some("chess club"), "kim", 1)],
        };
        let hits = rank("chess", &candidates, Utc::now(), DEFAULT_MIN_SCORE, 10);

        assert_eq!(hits.len(), 3);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(hits.iter().all(|h| h.label != "zzz"));

        let top_one = rank("chess", &candidates, Utc::now(), DEFAULT_MIN_SCORE, 1);
        assert_eq!(top_one.len(), 1);
        assert_eq!(top_one[0].id, hits[0].id);
    }

    #[test]
    fn test_rank_tie_breaks_by_kind_then_label() {
        let candidates = Candidates {
            users: vec![user("bravo", "x", 0), user("alpha", "x", 0)],
            ..Default::default()
        };
        // Both miss "x" the same way on username and hit display_name exactly.
        let hits = rank("x", &candidates, Utc::now(), 0.0, 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].label, "alpha");
        assert_eq!(hits[1].label, "bravo");
    }

    #[test]
    fn test_search_query_normalization_and_limit() {
        let query = SearchQuery { q: "  Chess  Club ".into(), scope: SearchScope::All, limit: Some(500) };
        assert_eq!(query.normalized().as_deref(), Some("chess club"));
        assert_eq!(query.limit(), MAX_SEARCH_LIMIT);

        let blank = SearchQuery { q: "   ".into(), scope: SearchScope::Users, limit: None };
        assert!(blank.normalized().is_none());
        assert_eq!(blank.limit(), DEFAULT_SEARCH_LIMIT);

        let parsed: SearchQuery = serde_json::from_str(r#"{"q":"x","type":"streams"}"#).unwrap();
        assert_eq!(parsed.scope, SearchScope::Streams);
    }

    #[test]
    fn test_scope_includes() {
        assert!(SearchScope::All.includes(EntityKind::Story));
        assert!(SearchScope::Users.includes(EntityKind::User));
        assert!(!SearchScope::Users.includes(EntityKind::Stream));
    }
}
