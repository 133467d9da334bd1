//! Deposit and withdrawal models with their state machines.
//!
//! Deposits: `pending -> completed | failed | cancelled`.
//!
//! Withdrawals: `pending -> processing -> completed`, with
//! `pending | processing -> rejected` and `pending -> cancelled`.
//! Funds for a withdrawal are moved from `balance` to `held` when it is
//! requested and released (or refunded) when it reaches a terminal state.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::TransitionError;
use crate::money::{Coins, MAX_TRANSFER_AMOUNT};

// ============================================================================
// Deposits
// ============================================================================

/// Deposit lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum DepositStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::Pending => "pending",
            DepositStatus::Completed => "completed",
            DepositStatus::Failed => "failed",
            DepositStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DepositStatus::Pending),
            "completed" => Some(DepositStatus::Completed),
            "failed" => Some(DepositStatus::Failed),
            "cancelled" => Some(DepositStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DepositStatus::Pending)
    }

    pub fn can_transition_to(&self, next: DepositStatus) -> bool {
        matches!(
            (self, next),
            (
                DepositStatus::Pending,
                DepositStatus::Completed | DepositStatus::Failed | DepositStatus::Cancelled
            )
        )
    }

    /// Validate a transition, returning the next state.
    pub fn transition(&self, next: DepositStatus) -> Result<DepositStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError::new("deposit", self.as_str(), next.as_str()))
        }
    }
}

impl std::fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request to add coins from an external payment.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Deposit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Coins,
    pub status: DepositStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Create deposit request.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
pub struct CreateDepositRequest {
    #[validate(range(min = 1, max = "MAX_TRANSFER_AMOUNT"))]
    pub amount: Coins,
    /// Payment provider name, e.g. "stripe".
    #[validate(length(min = 1, max = 32))]
    pub provider: String,
}

// ============================================================================
// Withdrawals
// ============================================================================

/// Withdrawal lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Rejected,
    Cancelled,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Processing => "processing",
            WithdrawalStatus::Completed => "completed",
            WithdrawalStatus::Rejected => "rejected",
            WithdrawalStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(WithdrawalStatus::Pending),
            "processing" => Some(WithdrawalStatus::Processing),
            "completed" => Some(WithdrawalStatus::Completed),
            "rejected" => Some(WithdrawalStatus::Rejected),
            "cancelled" => Some(WithdrawalStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WithdrawalStatus::Completed | WithdrawalStatus::Rejected | WithdrawalStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: WithdrawalStatus) -> bool {
        use WithdrawalStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Pending, Rejected)
                | (Processing, Rejected)
                | (Pending, Cancelled)
        )
    }

    pub fn transition(&self, next: WithdrawalStatus) -> Result<WithdrawalStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError::new("withdrawal", self.as_str(), next.as_str()))
        }
    }

    /// True when entering `next` returns the held funds to the balance.
    pub fn refunds_on(next: WithdrawalStatus) -> bool {
        matches!(next, WithdrawalStatus::Rejected | WithdrawalStatus::Cancelled)
    }
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A payout request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Withdrawal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Coins,
    /// Opaque payout destination (bank reference, payout account id).
    pub destination: String,
    pub status: WithdrawalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
pub struct CreateWithdrawalRequest {
    #[validate(range(min = 1, max = "MAX_TRANSFER_AMOUNT"))]
    pub amount: Coins,
    #[validate(length(min = 1, max = 128))]
    pub destination: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
pub struct RejectWithdrawalRequest {
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
}
