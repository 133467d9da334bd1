//! Wallet and ledger data models.
//!
//! Each user owns one wallet. Every change to `balance` or `held` is
//! mirrored by exactly one ledger entry on the affected wallet, so the
//! ledger can be replayed to audit the balance.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::money::{Coins, MAX_TRANSFER_AMOUNT};

/// A user's wallet.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Wallet {
    pub user_id: Uuid,
    /// Spendable coins.
    pub balance: Coins,
    /// Coins reserved by pending withdrawals.
    pub held: Coins,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn can_spend(&self, amount: Coins) -> bool {
        amount > 0 && self.balance >= amount
    }
}

/// Why a ledger entry was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryKind {
    TransferIn,
    TransferOut,
    Deposit,
    Withdrawal,
    WithdrawalRefund,
    SubscriptionCharge,
    SubscriptionIncome,
    GiftSent,
    GiftReceived,
}

impl LedgerEntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransferIn => "transfer_in",
            Self::TransferOut => "transfer_out",
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::WithdrawalRefund => "withdrawal_refund",
            Self::SubscriptionCharge => "subscription_charge",
            Self::SubscriptionIncome => "subscription_income",
            Self::GiftSent => "gift_sent",
            Self::GiftReceived => "gift_received",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "transfer_in" => Some(Self::TransferIn),
            "transfer_out" => Some(Self::TransferOut),
            "deposit" => Some(Self::Deposit),
            "withdrawal" => Some(Self::Withdrawal),
            "withdrawal_refund" => Some(Self::WithdrawalRefund),
            "subscription_charge" => Some(Self::SubscriptionCharge),
            "subscription_income" => Some(Self::SubscriptionIncome),
            "gift_sent" => Some(Self::GiftSent),
            "gift_received" => Some(Self::GiftReceived),
            _ => None,
        }
    }

    /// True for kinds that reduce the wallet balance.
    pub fn is_debit(&self) -> bool {
        matches!(
            self,
            Self::TransferOut | Self::Withdrawal | Self::SubscriptionCharge | Self::GiftSent
        )
    }

    /// Signed ledger amount for a movement of `amount` coins.
    pub fn signed(&self, amount: Coins) -> Coins {
        if self.is_debit() {
            -amount
        } else {
            amount
        }
    }
}

impl std::fmt::Display for LedgerEntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of a wallet's history.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: LedgerEntryKind,
    /// Signed amount: negative for debits.
    pub amount: Coins,
    /// Wallet balance right after this entry.
    pub balance_after: Coins,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterparty_id: Option<Uuid>,
    /// Transfer, deposit, withdrawal, subscription, or gift id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A completed peer-to-peer transfer.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Transfer {
    pub id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub amount: Coins,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transfer {
    /// Whether a replayed request describes the same transfer.
    pub fn matches_request(&self, request: &TransferRequest) -> bool {
        self.to_user_id == request.to_user_id && self.amount == request.amount
    }
}

/// Request to move coins to another user.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
pub struct TransferRequest {
    pub to_user_id: Uuid,
    #[validate(range(min = 1, max = "MAX_TRANSFER_AMOUNT"))]
    pub amount: Coins,
    #[validate(length(max = 200))]
    pub note: Option<String>,
    /// Client-chosen key; retrying with the same key never moves funds twice.
    #[validate(length(min = 1, max = 64))]
    pub idempotency_key: Option<String>,
}

/// Describes one side-by-side wallet movement between two users.
///
/// Used by transfers, subscription charges, and gifts so that all of
/// them share the ordered-locking transfer routine.
#[derive(Debug, Clone)]
pub struct FundsMovement {
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    /// Coins leaving the sender.
    pub debit: Coins,
    /// Coins reaching the recipient (less than `debit` when a fee applies).
    pub credit: Coins,
    pub debit_kind: LedgerEntryKind,
    pub credit_kind: LedgerEntryKind,
    pub reference_id: Uuid,
    pub note: Option<String>,
}

impl FundsMovement {
    /// A plain movement with no fee.
    pub fn even(
        from_user_id: Uuid,
        to_user_id: Uuid,
        amount: Coins,
        debit_kind: LedgerEntryKind,
        credit_kind: LedgerEntryKind,
        reference_id: Uuid,
    ) -> Self {
        Self {
            from_user_id,
            to_user_id,
            debit: amount,
            credit: amount,
            debit_kind,
            credit_kind,
            reference_id,
            note: None,
        }
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    /// Wallet ids in the order their rows must be locked.
    pub fn lock_order(&self) -> [Uuid; 2] {
        if self.from_user_id <= self.to_user_id {
            [self.from_user_id, self.to_user_id]
        } else {
            [self.to_user_id, self.from_user_id]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip_and_sign() {
        for kind in [
            LedgerEntryKind::TransferIn,
            LedgerEntryKind::TransferOut,
            LedgerEntryKind::Deposit,
            LedgerEntryKind::Withdrawal,
            LedgerEntryKind::WithdrawalRefund,
            LedgerEntryKind::SubscriptionCharge,
            LedgerEntryKind::SubscriptionIncome,
            LedgerEntryKind::GiftSent,
            LedgerEntryKind::GiftReceived,
        ] {
            assert_eq!(LedgerEntryKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(LedgerEntryKind::GiftSent.signed(40), -40);
        assert_eq!(LedgerEntryKind::GiftReceived.signed(40), 40);
        assert_eq!(LedgerEntryKind::from_str("bonus"), None);
    }

    #[test]
    fn test_transfer_request_validation() {
        let mut request = TransferRequest {
            to_user_id: Uuid::new_v4(),
            amount: 50,
            note: Some("rent".into()),
            idempotency_key: Some("abc".into()),
        };
        assert!(request.validate().is_ok());

        request.amount = 0;
        assert!(request.validate().is_err());

        request.amount = MAX_TRANSFER_AMOUNT + 1;
        assert!(request.validate().is_err());

        request.amount = 10;
        request.idempotency_key = Some(String::new());
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_lock_order_is_stable() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        let forward = FundsMovement::even(
            a,
            b,
            5,
            LedgerEntryKind::TransferOut,
            LedgerEntryKind::TransferIn,
            Uuid::new_v4(),
        );
        let backward = FundsMovement::even(
            b,
            a,
            5,
            LedgerEntryKind::TransferOut,
            LedgerEntryKind::TransferIn,
            Uuid::new_v4(),
        );
        assert_eq!(forward.lock_order(), backward.lock_order());
        assert_eq!(forward.lock_order(), [a, b]);
    }

    #[test]
    fn test_matches_request() {
        let to = Uuid::new_v4();
        let transfer = Transfer {
            id: Uuid::new_v4(),
            from_user_id: Uuid::new_v4(),
            to_user_id: to,
            amount: 10,
            note: None,
            idempotency_key: Some("k".into()),
            created_at: Utc::now(),
        };
        let same = TransferRequest {
            to_user_id: to,
            amount: 10,
            note: Some("different note is fine".into()),
            idempotency_key: Some("k".into()),
        };
        assert!(transfer.matches_request(&same));
        let other = TransferRequest { amount: 11, ..same };
        assert!(!transfer.matches_request(&other));
    }
}
