//! Prometheus metrics for the API server.

use std::sync::LazyLock;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use regex_lite::Regex;

use pulse_models::LedgerEntryKind;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "pulse_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "pulse_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "pulse_http_requests_in_flight";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "pulse_rate_limit_hits_total";

    // Money metrics
    pub const MONEY_MOVEMENTS_TOTAL: &str = "pulse_money_movements_total";
    pub const WEBHOOKS_TOTAL: &str = "pulse_payment_webhooks_total";
    pub const SUBSCRIPTION_RENEWALS_TOTAL: &str = "pulse_subscription_renewals_total";

    // Search metrics
    pub const SEARCH_QUERIES_TOTAL: &str = "pulse_search_queries_total";
    pub const SEARCH_RESULTS: &str = "pulse_search_results";
    pub const SEARCH_DURATION_SECONDS: &str = "pulse_search_duration_seconds";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Record a completed money movement initiated over the API.
pub fn record_money_movement(kind: LedgerEntryKind) {
    let labels = [("kind", kind.as_str().to_string())];
    counter!(names::MONEY_MOVEMENTS_TOTAL, &labels).increment(1);
}

/// Record a processed payment webhook.
pub fn record_webhook(result: &str) {
    let labels = [("result", result.to_string())];
    counter!(names::WEBHOOKS_TOTAL, &labels).increment(1);
}

/// Record renewal sweep outcomes.
pub fn record_renewals(renewed: u32, expired: u32, failed: u32) {
    counter!(names::SUBSCRIPTION_RENEWALS_TOTAL, "outcome" => "renewed").increment(u64::from(renewed));
    counter!(names::SUBSCRIPTION_RENEWALS_TOTAL, "outcome" => "expired").increment(u64::from(expired));
    counter!(names::SUBSCRIPTION_RENEWALS_TOTAL, "outcome" => "failed").increment(u64::from(failed));
}

/// Record a search query.
pub fn record_search(scope: &str, results: usize, duration_secs: f64) {
    let labels = [("scope", scope.to_string())];
    counter!(names::SEARCH_QUERIES_TOTAL, &labels).increment(1);
    histogram!(names::SEARCH_RESULTS, &labels).record(results as f64);
    histogram!(names::SEARCH_DURATION_SECONDS, &labels).record(duration_secs);
}

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("valid uuid pattern")
});

static NUMERIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/[0-9]+(/|$)").expect("valid numeric pattern"));

static REACTION_TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/reactions/(stream|comment|story)/").expect("valid reaction pattern")
});

/// Sanitize path for metrics labels (remove IDs, etc.).
fn sanitize_path(path: &str) -> String {
    let path = UUID_RE.replace_all(path, ":id");
    let path = NUMERIC_RE.replace_all(&path, "/:id$1");
    let path = REACTION_TARGET_RE.replace_all(&path, "/reactions/:target_type/");
    path.to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/streams/550e8400-e29b-41d4-a716-446655440000/comments"),
            "/api/streams/:id/comments"
        );
        assert_eq!(
            sanitize_path("/api/reactions/comment/550e8400-e29b-41d4-a716-446655440000"),
            "/api/reactions/:target_type/:id"
        );
        assert_eq!(sanitize_path("/api/wallet/ledger"), "/api/wallet/ledger");
    }
}
