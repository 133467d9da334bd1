//! Row types and their conversion into `pulse_models` types.
//!
//! Enum columns are stored as text and parsed on the way out; an unknown
//! value is a decode error, not a domain error.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use pulse_models::{
    Comment, Deposit, DepositStatus, FeedStory, FollowEdge, Gift, GiftSend, LedgerEntry,
    LedgerEntryKind, MediaType, Payment, PaymentStatus, Report, ReportReason, ReportStatus,
    ReportTarget, Story, StoryViewer, Stream, Subscription, SubscriptionStatus, SubscriptionTier,
    Transfer, User, UserRole, Wallet, Withdrawal, WithdrawalStatus,
};

use crate::error::{DbError, DbResult};

fn decode<T>(column: &str, value: &str, parsed: Option<T>) -> DbResult<T> {
    parsed.ok_or_else(|| {
        DbError::Query(sqlx::Error::Decode(
            format!("unknown {} '{}'", column, value).into(),
        ))
    })
}

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, FromRow)]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub role: String,
    pub follower_count: i64,
    pub following_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            display_name: row.display_name,
            bio: row.bio,
            avatar_url: row.avatar_url,
            role: UserRole::from_str(&row.role),
            follower_count: row.follower_count,
            following_count: row.following_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct FollowEdgeRow {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub followed_at: DateTime<Utc>,
}

impl From<FollowEdgeRow> for FollowEdge {
    fn from(row: FollowEdgeRow) -> Self {
        Self {
            user_id: row.user_id,
            username: row.username,
            display_name: row.display_name,
            followed_at: row.followed_at,
        }
    }
}

// =============================================================================
// Wallet
// =============================================================================

#[derive(Debug, FromRow)]
pub(crate) struct WalletRow {
    pub user_id: Uuid,
    pub balance: i64,
    pub held: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<WalletRow> for Wallet {
    fn from(row: WalletRow) -> Self {
        Self {
            user_id: row.user_id,
            balance: row.balance,
            held: row.held,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct LedgerEntryRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub amount: i64,
    pub balance_after: i64,
    pub counterparty_id: Option<Uuid>,
    pub reference_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<LedgerEntryRow> for LedgerEntry {
    type Error = DbError;

    fn try_from(row: LedgerEntryRow) -> DbResult<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            kind: decode("ledger kind", &row.kind, LedgerEntryKind::from_str(&row.kind))?,
            amount: row.amount,
            balance_after: row.balance_after,
            counterparty_id: row.counterparty_id,
            reference_id: row.reference_id,
            note: row.note,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct TransferRow {
    pub id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub amount: i64,
    pub note: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<TransferRow> for Transfer {
    fn from(row: TransferRow) -> Self {
        Self {
            id: row.id,
            from_user_id: row.from_user_id,
            to_user_id: row.to_user_id,
            amount: row.amount,
            note: row.note,
            idempotency_key: row.idempotency_key,
            created_at: row.created_at,
        }
    }
}

// =============================================================================
// Funding
// =============================================================================

#[derive(Debug, FromRow)]
pub(crate) struct DepositRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub status: String,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<DepositRow> for Deposit {
    type Error = DbError;

    fn try_from(row: DepositRow) -> DbResult<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            status: decode("deposit status", &row.status, DepositStatus::from_str(&row.status))?,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct PaymentRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub deposit_id: Uuid,
    pub provider: String,
    pub provider_ref: String,
    pub amount: i64,
    pub status: String,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DbError;

    fn try_from(row: PaymentRow) -> DbResult<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            deposit_id: row.deposit_id,
            provider: row.provider,
            provider_ref: row.provider_ref,
            amount: row.amount,
            status: decode("payment status", &row.status, PaymentStatus::from_str(&row.status))?,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct WithdrawalRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: i64,
    pub destination: String,
    pub status: String,
    pub failure_reason: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<WithdrawalRow> for Withdrawal {
    type Error = DbError;

    fn try_from(row: WithdrawalRow) -> DbResult<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            amount: row.amount,
            destination: row.destination,
            status: decode(
                "withdrawal status",
                &row.status,
                WithdrawalStatus::from_str(&row.status),
            )?,
            failure_reason: row.failure_reason,
            reviewed_by: row.reviewed_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

#[derive(Debug, FromRow)]
pub(crate) struct TierRow {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub period_days: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<TierRow> for SubscriptionTier {
    fn from(row: TierRow) -> Self {
        Self {
            id: row.id,
            creator_id: row.creator_id,
            name: row.name,
            description: row.description,
            price: row.price,
            period_days: row.period_days,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct SubscriptionRow {
    pub id: Uuid,
    pub subscriber_id: Uuid,
    pub creator_id: Uuid,
    pub tier_id: Uuid,
    pub status: String,
    pub price: i64,
    pub auto_renew: bool,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DbError;

    fn try_from(row: SubscriptionRow) -> DbResult<Self> {
        Ok(Self {
            id: row.id,
            subscriber_id: row.subscriber_id,
            creator_id: row.creator_id,
            tier_id: row.tier_id,
            status: decode(
                "subscription status",
                &row.status,
                SubscriptionStatus::from_str(&row.status),
            )?,
            price: row.price,
            auto_renew: row.auto_renew,
            current_period_start: row.current_period_start,
            current_period_end: row.current_period_end,
            cancelled_at: row.cancelled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// =============================================================================
// Streams and comments
// =============================================================================

#[derive(Debug, FromRow)]
pub(crate) struct StreamRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub is_live: bool,
    pub viewer_count: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StreamRow> for Stream {
    fn from(row: StreamRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            description: row.description,
            category: row.category,
            tags: row.tags,
            is_live: row.is_live,
            viewer_count: row.viewer_count,
            started_at: row.started_at,
            ended_at: row.ended_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct CommentRow {
    pub id: Uuid,
    pub stream_id: Uuid,
    pub author_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub body: String,
    pub is_deleted: bool,
    pub reply_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            stream_id: row.stream_id,
            author_id: row.author_id,
            parent_id: row.parent_id,
            // Soft-deleted comments keep their slot but not their text.
            body: if row.is_deleted { String::new() } else { row.body },
            is_deleted: row.is_deleted,
            reply_count: row.reply_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

// =============================================================================
// Stories
// =============================================================================

#[derive(Debug, FromRow)]
pub(crate) struct StoryRow {
    pub id: Uuid,
    pub author_id: Uuid,
    pub media_url: String,
    pub media_type: String,
    pub caption: Option<String>,
    pub view_count: i64,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<StoryRow> for Story {
    type Error = DbError;

    fn try_from(row: StoryRow) -> DbResult<Self> {
        Ok(Self {
            id: row.id,
            author_id: row.author_id,
            media_url: row.media_url,
            media_type: decode("media type", &row.media_type, MediaType::from_str(&row.media_type))?,
            caption: row.caption,
            view_count: row.view_count,
            expires_at: row.expires_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct FeedStoryRow {
    #[sqlx(flatten)]
    pub story: StoryRow,
    pub author_username: String,
    pub viewed: bool,
}

impl TryFrom<FeedStoryRow> for FeedStory {
    type Error = DbError;

    fn try_from(row: FeedStoryRow) -> DbResult<Self> {
        Ok(Self {
            story: row.story.try_into()?,
            author_username: row.author_username,
            viewed: row.viewed,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct StoryViewerRow {
    pub viewer_id: Uuid,
    pub username: String,
    pub viewed_at: DateTime<Utc>,
}

impl From<StoryViewerRow> for StoryViewer {
    fn from(row: StoryViewerRow) -> Self {
        Self {
            viewer_id: row.viewer_id,
            username: row.username,
            viewed_at: row.viewed_at,
        }
    }
}

// =============================================================================
// Gifts
// =============================================================================

#[derive(Debug, FromRow)]
pub(crate) struct GiftRow {
    pub id: Uuid,
    pub name: String,
    pub price: i64,
    pub icon_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<GiftRow> for Gift {
    fn from(row: GiftRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            price: row.price,
            icon_url: row.icon_url,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct GiftSendRow {
    pub id: Uuid,
    pub gift_id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub stream_id: Option<Uuid>,
    pub quantity: i32,
    pub total_price: i64,
    pub platform_fee: i64,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<GiftSendRow> for GiftSend {
    fn from(row: GiftSendRow) -> Self {
        Self {
            id: row.id,
            gift_id: row.gift_id,
            sender_id: row.sender_id,
            recipient_id: row.recipient_id,
            stream_id: row.stream_id,
            quantity: row.quantity,
            total_price: row.total_price,
            platform_fee: row.platform_fee,
            message: row.message,
            created_at: row.created_at,
        }
    }
}

// =============================================================================
// Reports
// =============================================================================

#[derive(Debug, FromRow)]
pub(crate) struct ReportRow {
    pub id: Uuid,
    pub reporter_id: Uuid,
    pub target_type: String,
    pub target_id: Uuid,
    pub reason: String,
    pub details: Option<String>,
    pub status: String,
    pub resolution_note: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ReportRow> for Report {
    type Error = DbError;

    fn try_from(row: ReportRow) -> DbResult<Self> {
        Ok(Self {
            id: row.id,
            reporter_id: row.reporter_id,
            target_type: decode(
                "report target",
                &row.target_type,
                ReportTarget::from_str(&row.target_type),
            )?,
            target_id: row.target_id,
            reason: decode("report reason", &row.reason, ReportReason::from_str(&row.reason))?,
            details: row.details,
            status: decode("report status", &row.status, ReportStatus::from_str(&row.status))?,
            resolution_note: row.resolution_note,
            reviewed_by: row.reviewed_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Convert a batch of rows, failing on the first bad one.
pub(crate) fn convert_all<R, T>(rows: Vec<R>) -> DbResult<Vec<T>>
where
    T: TryFrom<R, Error = DbError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_enum_value_is_decode_error() {
        let row = DepositRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            amount: 10,
            status: "exploded".into(),
            failure_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        };
        let err = Deposit::try_from(row).unwrap_err();
        assert!(matches!(err, DbError::Query(sqlx::Error::Decode(_))));
    }

    #[test]
    fn test_deleted_comment_body_is_blanked() {
        let row = CommentRow {
            id: Uuid::new_v4(),
            stream_id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            parent_id: None,
            body: "secret".into(),
            is_deleted: true,
            reply_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let comment = Comment::from(row);
        assert!(comment.body.is_empty());
        assert!(comment.is_deleted);
    }

    #[test]
    fn test_convert_all_parses_kinds() {
        let rows = vec![LedgerEntryRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            kind: "gift_received".into(),
            amount: 80,
            balance_after: 80,
            counterparty_id: None,
            reference_id: None,
            note: None,
            created_at: Utc::now(),
        }];
        let entries: Vec<LedgerEntry> = convert_all(rows).unwrap();
        assert_eq!(entries[0].kind, LedgerEntryKind::GiftReceived);
    }
}
