//! API routes.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::handlers::{admin, gifts, reactions, reports, search, stories, streams, subscriptions, users, wallet};
use crate::handlers::{health, ready};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, rate_limit_middleware, request_id, request_logging, security_headers, RateLimiterCache};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let user_routes = Router::new()
        .route("/users/me", get(users::get_me))
        .route("/users/me", patch(users::update_me))
        .route("/users/:user_id", get(users::get_user))
        .route("/users/:user_id/follow", post(users::follow_user))
        .route("/users/:user_id/follow", delete(users::unfollow_user))
        .route("/users/:user_id/followers", get(users::list_followers))
        .route("/users/:user_id/following", get(users::list_following))
        .route("/users/:user_id/streams", get(users::list_user_streams))
        .route("/users/:user_id/stories", get(users::list_user_stories));

    let wallet_routes = Router::new()
        .route("/wallet", get(wallet::get_wallet))
        .route("/wallet/ledger", get(wallet::list_ledger))
        .route("/wallet/transfers", post(wallet::create_transfer))
        .route("/wallet/transfers", get(wallet::list_transfers))
        // Deposits
        .route("/wallet/deposits", post(wallet::create_deposit))
        .route("/wallet/deposits", get(wallet::list_deposits))
        .route("/wallet/deposits/:deposit_id/cancel", post(wallet::cancel_deposit))
        // Withdrawals
        .route("/wallet/withdrawals", post(wallet::create_withdrawal))
        .route("/wallet/withdrawals", get(wallet::list_withdrawals))
        .route("/wallet/withdrawals/:withdrawal_id/cancel", post(wallet::cancel_withdrawal))
        .route("/payments", get(wallet::list_payments));

    let subscription_routes = Router::new()
        .route("/creator/tiers", post(subscriptions::create_tier))
        .route("/creator/tiers/:tier_id", delete(subscriptions::deactivate_tier))
        .route("/creators/:creator_id/tiers", get(subscriptions::list_creator_tiers))
        .route("/subscriptions", post(subscriptions::subscribe))
        .route("/subscriptions", get(subscriptions::list_my_subscriptions))
        .route("/subscriptions/subscribers", get(subscriptions::list_subscribers))
        .route("/subscriptions/:subscription_id/cancel", post(subscriptions::cancel_subscription))
        .route("/subscriptions/:subscription_id/resume", post(subscriptions::resume_subscription));

    let stream_routes = Router::new()
        .route("/streams", post(streams::create_stream))
        .route("/streams/live", get(streams::list_live_streams))
        .route("/streams/:stream_id", get(streams::get_stream))
        .route("/streams/:stream_id", patch(streams::update_stream))
        .route("/streams/:stream_id/live", post(streams::go_live))
        .route("/streams/:stream_id/end", post(streams::end_stream))
        // Comments
        .route("/streams/:stream_id/comments", post(streams::create_comment))
        .route("/streams/:stream_id/comments", get(streams::list_comments))
        .route("/comments/:comment_id/replies", get(streams::list_replies))
        .route("/comments/:comment_id", patch(streams::edit_comment))
        .route("/comments/:comment_id", delete(streams::delete_comment));

    let social_routes = Router::new()
        .route("/reactions", put(reactions::react))
        .route("/reactions/:target_type/:target_id", get(reactions::reaction_summary))
        .route("/reactions/:target_type/:target_id", delete(reactions::unreact))
        // Stories
        .route("/stories", post(stories::create_story))
        .route("/stories/feed", get(stories::story_feed))
        .route("/stories/:story_id/view", post(stories::view_story))
        .route("/stories/:story_id/viewers", get(stories::story_viewers))
        .route("/stories/:story_id", delete(stories::delete_story))
        // Gifts
        .route("/gifts", get(gifts::gift_catalog))
        .route("/gifts/send", post(gifts::send_gift))
        .route("/gifts/sent", get(gifts::gifts_sent))
        .route("/gifts/received", get(gifts::gifts_received))
        // Reports and search
        .route("/reports", post(reports::create_report))
        .route("/reports/mine", get(reports::my_reports))
        .route("/search", get(search::search));

    // Admin (withdrawals, catalog) and moderator (reports) routes
    let admin_routes = Router::new()
        .route("/admin/withdrawals", get(admin::list_withdrawals))
        .route("/admin/withdrawals/:withdrawal_id/approve", post(admin::approve_withdrawal))
        .route("/admin/withdrawals/:withdrawal_id/complete", post(admin::complete_withdrawal))
        .route("/admin/withdrawals/:withdrawal_id/reject", post(admin::reject_withdrawal))
        .route("/admin/gifts", post(admin::create_gift))
        .route("/admin/reports", get(admin::list_reports))
        .route("/admin/reports/:report_id/review", post(admin::review_report));

    // Per-IP limiter for everything under /api
    let rate_limiter = Arc::new(RateLimiterCache::new(
        state.config.rate_limit_rps,
        state.config.rate_limit_burst,
    ));

    let api_routes = Router::new()
        .merge(user_routes)
        .merge(wallet_routes)
        .merge(subscription_routes)
        .merge(stream_routes)
        .merge(social_routes)
        .merge(admin_routes)
        // Signed by the payment provider; no bearer token
        .route("/payments/webhook", post(wallet::payment_webhook))
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(TimeoutLayer::new(state.config.request_timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
