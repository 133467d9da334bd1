//! External payment records and webhook events.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TransitionError;
use crate::funding::Deposit;
use crate::money::Coins;

/// Payment lifecycle, mirroring the provider's view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Succeeded,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "succeeded" => Some(PaymentStatus::Succeeded),
            "failed" => Some(PaymentStatus::Failed),
            "cancelled" => Some(PaymentStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub fn transition(&self, next: PaymentStatus) -> Result<PaymentStatus, TransitionError> {
        if *self == PaymentStatus::Pending && next != PaymentStatus::Pending {
            Ok(next)
        } else {
            Err(TransitionError::new("payment", self.as_str(), next.as_str()))
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A payment collected by an external provider to fund a deposit.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub deposit_id: Uuid,
    pub provider: String,
    /// Reference the provider echoes back in webhooks.
    pub provider_ref: String,
    pub amount: Coins,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Returned when a deposit is opened.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DepositIntent {
    pub deposit: Deposit,
    pub payment: Payment,
}

/// Outcome reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Succeeded,
    Failed,
}

/// Body of `POST /api/payments/webhook`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PaymentWebhookEvent {
    pub provider_ref: String,
    pub status: WebhookOutcome,
    pub amount: Coins,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// What the webhook did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WebhookResult {
    Credited,
    MarkedFailed,
    AlreadyProcessed,
}
