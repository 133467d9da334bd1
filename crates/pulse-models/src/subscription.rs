//! Creator subscription tiers and subscriptions.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::TransitionError;
use crate::money::Coins;

/// Maximum tier price.
pub const MAX_TIER_PRICE: Coins = 1_000_000;

/// Maximum billing period.
pub const MAX_PERIOD_DAYS: i32 = 365;

/// A creator-defined subscription offer.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SubscriptionTier {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub price: Coins,
    pub period_days: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl SubscriptionTier {
    pub fn period(&self) -> Duration {
        Duration::days(i64::from(self.period_days))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
pub struct CreateTierRequest {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[validate(range(min = 1, max = "MAX_TIER_PRICE"))]
    pub price: Coins,
    #[validate(range(min = 1, max = "MAX_PERIOD_DAYS"))]
    pub period_days: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SubscribeRequest {
    pub tier_id: Uuid,
}

/// Subscription lifecycle.
///
/// `cancelled` keeps access until the current period ends; the renewal
/// sweep then moves it to `expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SubscriptionStatus::Active),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            "expired" => Some(SubscriptionStatus::Expired),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: SubscriptionStatus) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, next),
            (Active, Cancelled) | (Cancelled, Active) | (Active, Expired) | (Cancelled, Expired)
        )
    }

    pub fn transition(&self, next: SubscriptionStatus) -> Result<SubscriptionStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError::new("subscription", self.as_str(), next.as_str()))
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A subscriber's paid access to a creator.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Subscription {
    pub id: Uuid,
    pub subscriber_id: Uuid,
    pub creator_id: Uuid,
    pub tier_id: Uuid,
    pub status: SubscriptionStatus,
    /// Price locked in at subscribe time.
    pub price: Coins,
    pub auto_renew: bool,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What the renewal sweep should do with a due subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalDecision {
    /// Period has not ended yet.
    NotDue,
    /// Charge and extend by one period.
    Renew,
    /// Let it lapse.
    Expire,
}

impl Subscription {
    /// Access is granted while the period runs, even after cancelling.
    pub fn has_access(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.status,
            SubscriptionStatus::Active | SubscriptionStatus::Cancelled
        ) && now < self.current_period_end
    }

    /// Decide what to do at `now`, given whether the subscriber can pay.
    pub fn renewal_decision(&self, now: DateTime<Utc>, can_pay: bool) -> RenewalDecision {
        if self.status == SubscriptionStatus::Expired || now < self.current_period_end {
            return RenewalDecision::NotDue;
        }
        if self.status == SubscriptionStatus::Active && self.auto_renew && can_pay {
            RenewalDecision::Renew
        } else {
            RenewalDecision::Expire
        }
    }

    /// Next period window, anchored on the old period end so that late
    /// sweeps do not shift the billing cycle.
    pub fn next_period(&self, period_days: i32) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.current_period_end;
        (start, start + Duration::days(i64::from(period_days)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(status: SubscriptionStatus, end_offset_hours: i64, auto_renew: bool) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: Uuid::new_v4(),
            subscriber_id: Uuid::new_v4(),
            creator_id: Uuid::new_v4(),
            tier_id: Uuid::new_v4(),
            status,
            price: 100,
            auto_renew,
            current_period_start: now - Duration::days(30),
            current_period_end: now + Duration::hours(end_offset_hours),
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_access_window() {
        let now = Utc::now();
        assert!(subscription(SubscriptionStatus::Active, 5, true).has_access(now));
        assert!(subscription(SubscriptionStatus::Cancelled, 5, false).has_access(now));
        assert!(!subscription(SubscriptionStatus::Active, -1, true).has_access(now));
        assert!(!subscription(SubscriptionStatus::Expired, 5, false).has_access(now));
    }

    #[test]
    fn test_renewal_decision() {
        let now = Utc::now();
        let due = subscription(SubscriptionStatus::Active, -1, true);
        assert_eq!(due.renewal_decision(now, true), RenewalDecision::Renew);
        assert_eq!(due.renewal_decision(now, false), RenewalDecision::Expire);

        let cancelled = subscription(SubscriptionStatus::Cancelled, -1, false);
        assert_eq!(cancelled.renewal_decision(now, true), RenewalDecision::Expire);

        let running = subscription(SubscriptionStatus::Active, 2, true);
        assert_eq!(running.renewal_decision(now, true), RenewalDecision::NotDue);
    }

    #[test]
    fn test_next_period_anchored_on_old_end() {
        let sub = subscription(SubscriptionStatus::Active, -48, true);
        let (start, end) = sub.next_period(30);
        assert_eq!(start, sub.current_period_end);
        assert_eq!(end - start, Duration::days(30));
    }

    #[test]
    fn test_status_transitions() {
        use SubscriptionStatus::*;
        assert!(Active.can_transition_to(Cancelled));
        assert!(Cancelled.can_transition_to(Active));
        assert!(!Expired.can_transition_to(Active));
        assert!(Expired.transition(Cancelled).is_err());
    }

    #[test]
    fn test_tier_request_validation() {
        let request = CreateTierRequest {
            name: "Gold".into(),
            description: None,
            price: 500,
            period_days: 30,
        };
        assert!(request.validate().is_ok());
        let bad = CreateTierRequest { period_days: 0, ..request.clone() };
        assert!(bad.validate().is_err());
        let pricey = CreateTierRequest { price: MAX_TIER_PRICE + 1, ..request };
        assert!(pricey.validate().is_err());
    }
}
