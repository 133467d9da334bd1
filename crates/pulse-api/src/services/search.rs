//! Search: load candidates, rank in memory.

use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use pulse_db::SearchRepository;
use pulse_models::search::rank;
use pulse_models::{SearchHit, SearchQuery, SearchScope};

use crate::error::{ApiError, ApiResult};
use crate::metrics;

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    /// Normalized query text
    pub query: String,
    #[serde(rename = "type")]
    pub scope: SearchScope,
    pub results: Vec<SearchHit>,
}

/// Search service.
#[derive(Clone)]
pub struct SearchService {
    repo: SearchRepository,
    candidate_limit: u32,
    min_score: f64,
}

impl SearchService {
    pub fn new(repo: SearchRepository, candidate_limit: u32, min_score: f64) -> Self {
        Self {
            repo,
            candidate_limit: candidate_limit.max(1),
            min_score,
        }
    }

    /// Validate the query. Fails before touching the database.
    pub fn parse(query: &SearchQuery) -> ApiResult<String> {
        query
            .normalized()
            .ok_or_else(|| ApiError::Validation("q: must be 1..=100 characters".to_string()))
    }

    pub async fn search(&self, query: &SearchQuery) -> ApiResult<SearchResponse> {
        let q = Self::parse(query)?;
        let start = Instant::now();

        let candidates = self.repo.candidates(query.scope, self.candidate_limit).await?;
        let results = rank(&q, &candidates, Utc::now(), self.min_score, query.limit());

        metrics::record_search(
            scope_label(query.scope),
            results.len(),
            start.elapsed().as_secs_f64(),
        );

        Ok(SearchResponse {
            query: q,
            scope: query.scope,
            results,
        })
    }
}

fn scope_label(scope: SearchScope) -> &'static str {
    match scope {
        SearchScope::All => "all",
        SearchScope::Users => "users",
        SearchScope::Streams => "streams",
        SearchScope::Stories => "stories",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(q: &str) -> SearchQuery {
        SearchQuery {
            q: q.to_string(),
            scope: SearchScope::All,
            limit: None,
        }
    }

    #[test]
    fn test_parse_normalizes() {
        assert_eq!(SearchService::parse(&query("  Chess   Club ")).unwrap(), "chess club");
    }

    #[test]
    fn test_parse_rejects_blank_and_long() {
        assert!(matches!(SearchService::parse(&query("   ")), Err(ApiError::Validation(_))));
        assert!(SearchService::parse(&query(&"a".repeat(101))).is_err());
    }
}
