//! Shared data models for the Pulse backend.
//!
//! This crate provides Serde-serializable types for:
//! - Users, profiles, and follows
//! - Coin wallets, ledger entries, transfers, deposits, and withdrawals
//! - Payments, creator subscriptions, and gifts
//! - Streams, comments, reactions, and stories
//! - Moderation reports
//! - Fuzzy search scoring
//!
//! State machines and money arithmetic live here so they can be tested
//! without a database.

pub mod comment;
pub mod error;
pub mod follow;
pub mod funding;
pub mod gift;
pub mod money;
pub mod pagination;
pub mod payment;
pub mod reaction;
pub mod report;
pub mod search;
pub mod story;
pub mod stream;
pub mod subscription;
pub mod user;
pub mod wallet;

// Re-export common types
pub use comment::{Comment, CreateCommentRequest, EditCommentRequest};
pub use error::{MoneyError, TransitionError};
pub use follow::{FollowEdge, FollowState};
pub use funding::{
    CreateDepositRequest, CreateWithdrawalRequest, Deposit, DepositStatus, RejectWithdrawalRequest,
    Withdrawal, WithdrawalStatus,
};
pub use gift::{CreateGiftRequest, Gift, GiftSend, SendGiftRequest};
pub use money::{Coins, FeeSplit};
pub use pagination::{Page, PageQuery};
pub use payment::{
    DepositIntent, Payment, PaymentStatus, PaymentWebhookEvent, WebhookOutcome, WebhookResult,
};
pub use reaction::{ReactRequest, ReactionKind, ReactionSummary, ReactionTarget};
pub use report::{
    CreateReportRequest, Report, ReportReason, ReportStatus, ReportTarget, ReviewReportRequest,
};
pub use search::{EntityKind, SearchHit, SearchQuery, SearchScope};
pub use story::{CreateStoryRequest, FeedStory, MediaType, Story, StoryViewer};
pub use stream::{CreateStreamRequest, Stream, UpdateStreamRequest};
pub use subscription::{
    CreateTierRequest, RenewalDecision, SubscribeRequest, Subscription, SubscriptionStatus,
    SubscriptionTier,
};
pub use user::{PublicUser, UpdateProfileRequest, User, UserRole};
pub use wallet::{FundsMovement, LedgerEntry, LedgerEntryKind, Transfer, TransferRequest, Wallet};
