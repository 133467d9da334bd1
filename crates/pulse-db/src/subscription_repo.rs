//! Creator tiers, subscriptions, and the renewal sweep.

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use pulse_models::{
    CreateTierRequest, FundsMovement, LedgerEntryKind, RenewalDecision, Subscription,
    SubscriptionStatus, SubscriptionTier,
};

use crate::error::{DbError, DbResult};
use crate::ledger::{self, Tx};
use crate::pool::Database;
use crate::retry::with_retry;
use crate::rows::{convert_all, SubscriptionRow, TierRow};

const TIER_COLUMNS: &str =
    "id, creator_id, name, description, price, period_days, is_active, created_at";

const SUBSCRIPTION_COLUMNS: &str = "id, subscriber_id, creator_id, tier_id, status, price, \
     auto_renew, current_period_start, current_period_end, cancelled_at, created_at, updated_at";

/// Outcome counts of one renewal sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenewalReport {
    pub renewed: u32,
    pub expired: u32,
    /// Claimed by another worker or no longer due.
    pub skipped: u32,
    pub failed: u32,
}

impl RenewalReport {
    pub fn total(&self) -> u32 {
        self.renewed + self.expired + self.skipped + self.failed
    }
}

/// Repository for subscription tiers and subscriptions.
#[derive(Clone)]
pub struct SubscriptionRepository {
    db: Database,
}

impl SubscriptionRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // =========================================================================
    // Tiers
    // =========================================================================

    pub async fn create_tier(
        &self,
        creator_id: Uuid,
        request: &CreateTierRequest,
    ) -> DbResult<SubscriptionTier> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(DbError::invalid("tier name must not be blank"));
        }

        let row: TierRow = sqlx::query_as(&format!(
            "INSERT INTO subscription_tiers (id, creator_id, name, description, price, period_days) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            TIER_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(creator_id)
        .bind(name)
        .bind(request.description.as_deref())
        .bind(request.price)
        .bind(request.period_days)
        .fetch_one(self.db.pool())
        .await?;

        info!(tier_id = %row.id, creator_id = %creator_id, price = row.price, "Tier created");
        Ok(row.into())
    }

    /// Active tiers for a creator, cheapest first.
    pub async fn list_tiers(&self, creator_id: Uuid) -> DbResult<Vec<SubscriptionTier>> {
        let rows: Vec<TierRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscription_tiers WHERE creator_id = $1 AND is_active \
             ORDER BY price ASC, created_at ASC",
            TIER_COLUMNS
        ))
        .bind(creator_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Stop offering a tier. Existing subscriptions keep running until they
    /// next come up for renewal.
    pub async fn deactivate_tier(&self, creator_id: Uuid, tier_id: Uuid) -> DbResult<SubscriptionTier> {
        let row: Option<TierRow> = sqlx::query_as(&format!(
            "UPDATE subscription_tiers SET is_active = FALSE \
             WHERE id = $1 AND creator_id = $2 RETURNING {}",
            TIER_COLUMNS
        ))
        .bind(tier_id)
        .bind(creator_id)
        .fetch_optional(self.db.pool())
        .await?;
        row.map(Into::into)
            .ok_or_else(|| DbError::not_found(format!("tier {}", tier_id)))
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Pay for the first period and create the subscription.
    #[instrument(skip(self))]
    pub async fn subscribe(&self, subscriber_id: Uuid, tier_id: Uuid) -> DbResult<Subscription> {
        with_retry(self.db.retry(), "subscribe", move || async move {
            let mut tx = self.db.pool().begin().await?;
            let now = Utc::now();

            let tier: SubscriptionTier = sqlx::query_as::<_, TierRow>(&format!(
                "SELECT {} FROM subscription_tiers WHERE id = $1",
                TIER_COLUMNS
            ))
            .bind(tier_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found(format!("tier {}", tier_id)))?
            .into();

            if !tier.is_active {
                return Err(DbError::InvalidState("tier is no longer offered".to_string()));
            }
            if tier.creator_id == subscriber_id {
                return Err(DbError::invalid("cannot subscribe to yourself"));
            }

            if let Some(existing) = lock_live(&mut tx, subscriber_id, tier.creator_id).await? {
                if existing.has_access(now) {
                    return Err(DbError::conflict("already subscribed to this creator"));
                }
                // Lapsed but not yet swept.
                set_status(&mut tx, existing.id, SubscriptionStatus::Expired).await?;
            }

            let subscription_id = Uuid::new_v4();
            let movement = FundsMovement::even(
                subscriber_id,
                tier.creator_id,
                tier.price,
                LedgerEntryKind::SubscriptionCharge,
                LedgerEntryKind::SubscriptionIncome,
                subscription_id,
            );
            ledger::move_funds(&mut tx, &movement).await?;

            let row: SubscriptionRow = sqlx::query_as(&format!(
                "INSERT INTO subscriptions \
                 (id, subscriber_id, creator_id, tier_id, price, current_period_start, current_period_end) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
                SUBSCRIPTION_COLUMNS
            ))
            .bind(subscription_id)
            .bind(subscriber_id)
            .bind(tier.creator_id)
            .bind(tier.id)
            .bind(tier.price)
            .bind(now)
            .bind(now + tier.period())
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            info!(
                subscription_id = %subscription_id,
                creator_id = %tier.creator_id,
                price = tier.price,
                "Subscribed"
            );
            row.try_into()
        })
        .await
    }

    /// Stop auto-renewal. Access continues until the period ends.
    pub async fn cancel(&self, subscriber_id: Uuid, subscription_id: Uuid) -> DbResult<Subscription> {
        let mut tx = self.db.pool().begin().await?;
        let subscription = lock_owned(&mut tx, subscriber_id, subscription_id).await?;
        let next = subscription.status.transition(SubscriptionStatus::Cancelled)?;

        let row: SubscriptionRow = sqlx::query_as(&format!(
            "UPDATE subscriptions SET status = $2, auto_renew = FALSE, \
             cancelled_at = clock_timestamp(), updated_at = clock_timestamp() \
             WHERE id = $1 RETURNING {}",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(subscription_id)
        .bind(next.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    /// Undo a cancellation while the period is still running.
    pub async fn resume(&self, subscriber_id: Uuid, subscription_id: Uuid) -> DbResult<Subscription> {
        let mut tx = self.db.pool().begin().await?;
        let subscription = lock_owned(&mut tx, subscriber_id, subscription_id).await?;
        let next = subscription.status.transition(SubscriptionStatus::Active)?;
        if !subscription.has_access(Utc::now()) {
            return Err(DbError::InvalidState("subscription period has ended".to_string()));
        }

        let row: SubscriptionRow = sqlx::query_as(&format!(
            "UPDATE subscriptions SET status = $2, auto_renew = TRUE, cancelled_at = NULL, \
             updated_at = clock_timestamp() WHERE id = $1 RETURNING {}",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(subscription_id)
        .bind(next.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    /// Subscriptions the user pays for, newest first.
    pub async fn list_mine(&self, subscriber_id: Uuid) -> DbResult<Vec<Subscription>> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions WHERE subscriber_id = $1 ORDER BY created_at DESC",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(subscriber_id)
        .fetch_all(self.db.pool())
        .await?;
        convert_all(rows)
    }

    /// Non-expired subscriptions to a creator, newest first.
    pub async fn list_subscribers(&self, creator_id: Uuid) -> DbResult<Vec<Subscription>> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions WHERE creator_id = $1 AND status <> 'expired' \
             ORDER BY created_at DESC",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(creator_id)
        .fetch_all(self.db.pool())
        .await?;
        convert_all(rows)
    }

    /// Whether `subscriber_id` currently has access to `creator_id`'s content.
    pub async fn has_access(
        &self,
        subscriber_id: Uuid,
        creator_id: Uuid,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM subscriptions \
             WHERE subscriber_id = $1 AND creator_id = $2 AND status <> 'expired'",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(subscriber_id)
        .bind(creator_id)
        .fetch_optional(self.db.pool())
        .await?;

        match row {
            Some(row) => Ok(Subscription::try_from(row)?.has_access(now)),
            None => Ok(false),
        }
    }

    // =========================================================================
    // Renewal sweep
    // =========================================================================

    /// Renew or expire up to `batch` subscriptions whose period ended by `now`.
    ///
    /// Each subscription gets its own transaction. Rows are claimed with
    /// `FOR UPDATE SKIP LOCKED` so concurrent sweepers never double-charge.
    #[instrument(skip(self))]
    pub async fn renew_due(&self, now: DateTime<Utc>, batch: u32) -> DbResult<RenewalReport> {
        let due: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM subscriptions \
             WHERE status IN ('active', 'cancelled') AND current_period_end <= $1 \
             ORDER BY current_period_end ASC LIMIT $2",
        )
        .bind(now)
        .bind(i64::from(batch))
        .fetch_all(self.db.pool())
        .await?;

        let mut report = RenewalReport::default();
        for (id,) in due {
            match self.renew_one(id, now).await {
                Ok(Some(RenewalDecision::Renew)) => report.renewed += 1,
                Ok(Some(RenewalDecision::Expire)) => report.expired += 1,
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    warn!(subscription_id = %id, error = %e, "Renewal failed");
                    report.failed += 1;
                }
            }
        }

        if report.total() > 0 {
            info!(
                renewed = report.renewed,
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                "Renewal sweep finished"
            );
        }
        Ok(report)
    }

    /// Returns the decision applied, or `None` when the row was skipped.
    async fn renew_one(&self, id: Uuid, now: DateTime<Utc>) -> DbResult<Option<RenewalDecision>> {
        with_retry(self.db.retry(), "renew_subscription", move || async move {
            let mut tx = self.db.pool().begin().await?;

            let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
                "SELECT {} FROM subscriptions \
                 WHERE id = $1 AND status IN ('active', 'cancelled') AND current_period_end <= $2 \
                 FOR UPDATE SKIP LOCKED",
                SUBSCRIPTION_COLUMNS
            ))
            .bind(id)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;
            let Some(row) = row else {
                debug!(subscription_id = %id, "Skipped: claimed elsewhere or no longer due");
                return Ok(None);
            };
            let subscription = Subscription::try_from(row)?;

            let tier: Option<(i32, bool)> = sqlx::query_as(
                "SELECT period_days, is_active FROM subscription_tiers WHERE id = $1",
            )
            .bind(subscription.tier_id)
            .fetch_optional(&mut *tx)
            .await?;
            let period_days = match tier {
                Some((days, true)) => Some(days),
                _ => None,
            };

            let mut decision = match period_days {
                Some(_) => subscription.renewal_decision(now, true),
                None => RenewalDecision::Expire,
            };

            if decision == RenewalDecision::Renew {
                let movement = FundsMovement::even(
                    subscription.subscriber_id,
                    subscription.creator_id,
                    subscription.price,
                    LedgerEntryKind::SubscriptionCharge,
                    LedgerEntryKind::SubscriptionIncome,
                    subscription.id,
                );
                match ledger::move_funds(&mut tx, &movement).await {
                    Ok(_) => {}
                    Err(DbError::InsufficientFunds { .. }) => {
                        decision = subscription.renewal_decision(now, false);
                    }
                    Err(e) => return Err(e),
                }
            }

            match (decision, period_days) {
                (RenewalDecision::Renew, Some(days)) => {
                    let (start, end) = subscription.next_period(days);
                    sqlx::query(
                        "UPDATE subscriptions SET current_period_start = $2, current_period_end = $3, \
                         updated_at = clock_timestamp() WHERE id = $1",
                    )
                    .bind(id)
                    .bind(start)
                    .bind(end)
                    .execute(&mut *tx)
                    .await?;
                    info!(subscription_id = %id, period_end = %end, "Subscription renewed");
                }
                _ => {
                    let next = subscription.status.transition(SubscriptionStatus::Expired)?;
                    set_status(&mut tx, id, next).await?;
                    info!(subscription_id = %id, "Subscription expired");
                    decision = RenewalDecision::Expire;
                }
            }

            tx.commit().await?;
            Ok(Some(decision))
        })
        .await
    }
}

// =============================================================================
// Transaction helpers
// =============================================================================

async fn lock_live(
    tx: &mut Tx<'_>,
    subscriber_id: Uuid,
    creator_id: Uuid,
) -> DbResult<Option<Subscription>> {
    let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
        "SELECT {} FROM subscriptions \
         WHERE subscriber_id = $1 AND creator_id = $2 AND status <> 'expired' FOR UPDATE",
        SUBSCRIPTION_COLUMNS
    ))
    .bind(subscriber_id)
    .bind(creator_id)
    .fetch_optional(&mut **tx)
    .await?;
    row.map(Subscription::try_from).transpose()
}

async fn lock_owned(
    tx: &mut Tx<'_>,
    subscriber_id: Uuid,
    subscription_id: Uuid,
) -> DbResult<Subscription> {
    let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
        "SELECT {} FROM subscriptions WHERE id = $1 FOR UPDATE",
        SUBSCRIPTION_COLUMNS
    ))
    .bind(subscription_id)
    .fetch_optional(&mut **tx)
    .await?;
    let subscription: Subscription = row
        .ok_or_else(|| DbError::not_found(format!("subscription {}", subscription_id)))?
        .try_into()?;
    if subscription.subscriber_id != subscriber_id {
        return Err(DbError::forbidden("subscription belongs to another user"));
    }
    Ok(subscription)
}

async fn set_status(tx: &mut Tx<'_>, id: Uuid, status: SubscriptionStatus) -> DbResult<()> {
    sqlx::query(
        "UPDATE subscriptions SET status = $2, updated_at = clock_timestamp() WHERE id = $1",
    )
    .bind(id)
    .bind(status.as_str())
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_total() {
        let report = RenewalReport {
            renewed: 2,
            expired: 1,
            skipped: 3,
            failed: 0,
        };
        assert_eq!(report.total(), 6);
    }
}
