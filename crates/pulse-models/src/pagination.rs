//! Cursor pagination shared by list endpoints.
//!
//! Cursors are the RFC 3339 `created_at` of the last item on the
//! previous page in UTC with microsecond precision (`...123456Z`);
//! lists are ordered newest first.

use chrono::{DateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default page size.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Maximum page size.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Query string for paginated lists.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct PageQuery {
    pub limit: Option<u32>,
    /// Return items created strictly before this timestamp.
    pub before: Option<String>,
}

impl PageQuery {
    /// Limit clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
    }

    /// Parse the cursor. `Err` carries a message for a 400 response.
    pub fn cursor(&self) -> Result<Option<DateTime<Utc>>, String> {
        match self.before.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|dt| Some(dt.with_timezone(&Utc)))
                .map_err(|_| format!("Invalid cursor '{}': expected an RFC 3339 timestamp", raw)),
        }
    }
}

/// A page of results.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// Build a page; a full page yields a cursor from the last item.
    pub fn from_items(items: Vec<T>, limit: u32, created_at: impl Fn(&T) -> DateTime<Utc>) -> Self {
        let next_cursor = if items.len() as u32 >= limit {
            items
                .last()
                .map(|last| created_at(last).to_rfc3339_opts(SecondsFormat::Micros, true))
        } else {
            None
        };
        Self { items, next_cursor }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_clamping() {
        assert_eq!(PageQuery::default().limit(), DEFAULT_PAGE_LIMIT);
        assert_eq!(PageQuery { limit: Some(0), before: None }.limit(), 1);
        assert_eq!(PageQuery { limit: Some(1000), before: None }.limit(), MAX_PAGE_LIMIT);
    }

    #[test]
    fn test_cursor_parsing() {
        let query = PageQuery {
            limit: None,
            before: Some("2025-06-01T12:00:00Z".into()),
        };
        assert!(query.cursor().unwrap().is_some());

        let bad = PageQuery {
            limit: None,
            before: Some("yesterday".into()),
        };
        assert!(bad.cursor().is_err());
    }

    #[test]
    fn test_page_cursor_only_when_full() {
        let now = Utc::now();
        let full = Page::from_items(vec![now, now], 2, |t| *t);
        assert!(full.next_cursor.is_some());
        let partial = Page::from_items(vec![now], 2, |t| *t);
        assert!(partial.next_cursor.is_none());
    }

    #[test]
    fn test_cursor_is_utc_and_round_trips() {
        use chrono::{Duration, TimeZone};

        let last = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap() + Duration::microseconds(123_456);
        let page = Page::from_items(vec![last], 1, |t| *t);
        let cursor = page.next_cursor.unwrap();
        assert_eq!(cursor, "2025-06-01T12:00:00.123456Z");

        let query = PageQuery { limit: None, before: Some(cursor) };
        assert_eq!(query.cursor().unwrap(), Some(last));
    }
}
