//! PostgreSQL access layer.
//!
//! This crate provides:
//! - Connection pool configuration and embedded migrations
//! - Typed repositories per resource (users, wallets, funding, subscriptions,
//!   streams and comments, reactions, stories, gifts, reports, search)
//! - A double-entry style ledger helper shared by every money movement
//! - Error classification and retry with jittered backoff

pub mod error;
pub mod funding_repo;
pub mod gift_repo;
mod ledger;
pub mod metrics;
pub mod pool;
pub mod reaction_repo;
pub mod report_repo;
pub mod retry;
mod rows;
pub mod search_repo;
pub mod story_repo;
pub mod stream_repo;
pub mod subscription_repo;
pub mod user_repo;
pub mod wallet_repo;

pub use error::{DbError, DbResult};
pub use funding_repo::FundingRepository;
pub use gift_repo::GiftRepository;
pub use pool::{Database, DbConfig};
pub use reaction_repo::ReactionRepository;
pub use report_repo::ReportRepository;
pub use retry::{with_retry, RetryConfig};
pub use search_repo::SearchRepository;
pub use story_repo::StoryRepository;
pub use stream_repo::{CommentModerator, StreamRepository};
pub use subscription_repo::{RenewalReport, SubscriptionRepository};
pub use user_repo::{NewUser, UserRepository};
pub use wallet_repo::{TransferOutcome, WalletRepository};
