//! Axum HTTP API server.
//!
//! This crate provides:
//! - REST endpoints for wallets, subscriptions, streams, stories, gifts, and reports
//! - HS256 bearer token verification
//! - Signed payment webhooks
//! - Rate limiting and security headers
//! - Prometheus metrics
//! - The subscription renewal background task

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{SearchService, SubscriptionRenewalTask, UserService};
pub use state::AppState;
