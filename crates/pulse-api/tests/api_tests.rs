//! Router tests that stop before the database.
//!
//! The pool is created lazily and never connects, so these cover the
//! auth, validation, signature, and rate limit paths only.

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use pulse_api::auth::{issue_token, Claims};
use pulse_api::security::{sign_payload, SIGNATURE_HEADER};
use pulse_api::{create_router, ApiConfig, AppState};
use pulse_db::{Database, DbConfig};

const JWT_SECRET: &str = "api-test-jwt-secret";
const WEBHOOK_SECRET: &str = "api-test-webhook-secret";

fn test_config() -> ApiConfig {
    ApiConfig {
        jwt_secret: JWT_SECRET.to_string(),
        payment_webhook_secret: WEBHOOK_SECRET.to_string(),
        enable_subscription_renewal: false,
        metrics_enabled: false,
        ..ApiConfig::default()
    }
}

fn app_with(config: ApiConfig) -> Router {
    let db = Database::connect_lazy(&DbConfig::with_url("postgres://localhost/pulse_test"))
        .expect("lazy pool");
    create_router(AppState::new(config, db), None)
}

fn app() -> Router {
    app_with(test_config())
}

fn token(role: &str) -> String {
    let claims = Claims {
        sub: Uuid::new_v4(),
        username: "api_tester".to_string(),
        role: role.to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp(),
        iss: None,
    };
    issue_token(JWT_SECRET, &claims).expect("token")
}

fn authed(method: Method, uri: &str, role: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token(role)))
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn health_is_public() {
    let response = app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let response = app()
        .oneshot(Request::builder().uri("/api/wallet").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "unauthorized");
    assert!(body["detail"].as_str().unwrap().contains("Authorization"));
}

#[tokio::test]
async fn expired_token_is_unauthorized() {
    let claims = Claims {
        sub: Uuid::new_v4(),
        username: "late_user".to_string(),
        role: "user".to_string(),
        exp: (Utc::now() - Duration::hours(2)).timestamp(),
        iss: None,
    };
    let expired = issue_token(JWT_SECRET, &claims).unwrap();

    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api/users/me")
                .header(header::AUTHORIZATION, format!("Bearer {}", expired))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn transfer_validation_fails_before_db() {
    let request = authed(Method::POST, "/api/wallet/transfers", "user")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "to_user_id": Uuid::new_v4(), "amount": 0 }).to_string(),
        ))
        .unwrap();

    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "validation_error");
    assert!(body["detail"].as_str().unwrap().contains("amount"));
}

#[tokio::test]
async fn empty_search_query_is_rejected() {
    let request = authed(Method::GET, "/api/search?q=%20%20&type=users", "user")
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "validation_error");
}

#[tokio::test]
async fn malformed_json_body_is_a_json_bad_request() {
    let request = authed(Method::POST, "/api/wallet/transfers", "user")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"to_user_id\": "))
        .unwrap();

    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    let body = body_json(response).await;
    assert_eq!(body["code"], "bad_request");
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn missing_search_term_is_a_json_bad_request() {
    let request = authed(Method::GET, "/api/search?type=users", "user")
        .body(Body::empty())
        .unwrap();

    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "bad_request");
    assert!(body["detail"].as_str().unwrap().contains("q"));
}

#[tokio::test]
async fn malformed_path_id_is_a_json_bad_request() {
    for uri in ["/api/stories/not-a-uuid/viewers", "/api/reactions/planet/not-a-uuid"] {
        let request = authed(Method::GET, uri, "user").body(Body::empty()).unwrap();

        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let body = body_json(response).await;
        assert_eq!(body["code"], "bad_request", "{}", uri);
    }
}

#[tokio::test]
async fn admin_routes_require_admin_role() {
    for role in ["user", "moderator"] {
        let request = authed(Method::GET, "/api/admin/withdrawals", role)
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "role {}", role);
    }

    let request = authed(Method::GET, "/api/admin/reports", "user")
        .body(Body::empty())
        .unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn webhook_rejects_bad_signature() {
    let payload = json!({ "provider_ref": "pay_1", "status": "succeeded", "amount": 500 }).to_string();

    let response = app()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/payments/webhook")
                .header(header::CONTENT_TYPE, "application/json")
                .header(SIGNATURE_HEADER, "bm90LWEtc2lnbmF0dXJl")
                .body(Body::from(payload.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let unsigned = app()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/payments/webhook")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(unsigned.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_with_valid_signature_rejects_malformed_json() {
    let payload = b"{\"provider_ref\": 42".to_vec();
    let signature = sign_payload(WEBHOOK_SECRET, &payload).unwrap();

    let response = app()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/payments/webhook")
                .header(SIGNATURE_HEADER, signature)
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn rate_limit_applies_per_ip() {
    let app = app_with(ApiConfig {
        rate_limit_rps: 1,
        rate_limit_burst: 1,
        ..test_config()
    });

    let request = |ip: &str| {
        Request::builder()
            .uri("/api/wallet")
            .header("X-Forwarded-For", ip)
            .body(Body::empty())
            .unwrap()
    };

    let first = app.clone().oneshot(request("203.0.113.7")).await.unwrap();
    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);

    let second = app.clone().oneshot(request("203.0.113.7")).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second.headers()[header::RETRY_AFTER], "1");
    let body = body_json(second).await;
    assert_eq!(body["code"], "rate_limited");

    let other_ip = app.oneshot(request("198.51.100.2")).await.unwrap();
    assert_eq!(other_ip.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_is_not_rate_limited() {
    let app = app_with(ApiConfig {
        rate_limit_rps: 1,
        rate_limit_burst: 1,
        ..test_config()
    });

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("X-Forwarded-For", "203.0.113.9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
