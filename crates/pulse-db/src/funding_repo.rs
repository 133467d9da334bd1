//! Deposits, withdrawals, and provider payments.
//!
//! Every state change locks the row `FOR UPDATE`, validates the
//! transition with the model's state machine, and applies the wallet
//! effect in the same transaction.

use tracing::{info, instrument, warn};
use uuid::Uuid;

use pulse_models::pagination::PageQuery;
use pulse_models::{
    CreateDepositRequest, CreateWithdrawalRequest, Deposit, DepositIntent, DepositStatus,
    LedgerEntryKind, Payment, PaymentStatus, PaymentWebhookEvent, WebhookOutcome, WebhookResult,
    Withdrawal, WithdrawalStatus,
};
use pulse_models::money::validate_amount;

use crate::error::{DbError, DbResult};
use crate::ledger::{self, NewEntry, Tx};
use crate::pool::Database;
use crate::retry::with_retry;
use crate::rows::{convert_all, DepositRow, PaymentRow, WithdrawalRow};

const DEPOSIT_COLUMNS: &str =
    "id, user_id, amount, status, failure_reason, created_at, updated_at, completed_at";

const PAYMENT_COLUMNS: &str = "id, user_id, deposit_id, provider, provider_ref, amount, status, \
     failure_reason, created_at, updated_at";

const WITHDRAWAL_COLUMNS: &str = "id, user_id, amount, destination, status, failure_reason, \
     reviewed_by, created_at, updated_at";

/// Provider reference handed to the client and echoed back by webhooks.
pub fn new_provider_ref(provider: &str) -> String {
    format!("{}_{}", provider, Uuid::new_v4().simple())
}

/// Repository for deposits, withdrawals, and payments.
#[derive(Clone)]
pub struct FundingRepository {
    db: Database,
}

impl FundingRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // =========================================================================
    // Deposits
    // =========================================================================

    /// Open a pending deposit and its pending payment.
    #[instrument(skip(self, request), fields(amount = request.amount))]
    pub async fn create_deposit(
        &self,
        user_id: Uuid,
        request: &CreateDepositRequest,
    ) -> DbResult<DepositIntent> {
        validate_amount(request.amount)?;
        let provider = request.provider.trim().to_ascii_lowercase();
        if provider.is_empty() {
            return Err(DbError::invalid("provider must not be blank"));
        }

        let mut tx = self.db.pool().begin().await?;
        ledger::ensure_wallet(&mut tx, user_id).await?;

        let deposit: DepositRow = sqlx::query_as(&format!(
            "INSERT INTO deposits (id, user_id, amount) VALUES ($1, $2, $3) RETURNING {}",
            DEPOSIT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(request.amount)
        .fetch_one(&mut *tx)
        .await?;

        let payment: PaymentRow = sqlx::query_as(&format!(
            "INSERT INTO payments (id, user_id, deposit_id, provider, provider_ref, amount) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(deposit.id)
        .bind(&provider)
        .bind(new_provider_ref(&provider))
        .bind(request.amount)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(deposit_id = %deposit.id, user_id = %user_id, "Deposit opened");
        Ok(DepositIntent {
            deposit: deposit.try_into()?,
            payment: payment.try_into()?,
        })
    }

    /// Cancel a pending deposit owned by `user_id`.
    #[instrument(skip(self))]
    pub async fn cancel_deposit(&self, user_id: Uuid, deposit_id: Uuid) -> DbResult<Deposit> {
        with_retry(self.db.retry(), "cancel_deposit", move || async move {
            let mut tx = self.db.pool().begin().await?;
            lock_payment_for_deposit(&mut tx, deposit_id).await?;
            let deposit = lock_deposit(&mut tx, deposit_id).await?;
            if deposit.user_id != user_id {
                return Err(DbError::forbidden("deposit belongs to another user"));
            }

            let next = deposit.status.transition(DepositStatus::Cancelled)?;
            let deposit = set_deposit_status(&mut tx, deposit_id, next, None).await?;
            set_payment_status_for_deposit(&mut tx, deposit_id, PaymentStatus::Cancelled, None)
                .await?;
            tx.commit().await?;
            Ok(deposit)
        })
        .await
    }

    /// Complete a pending deposit and credit the wallet.
    pub async fn complete_deposit(&self, deposit_id: Uuid) -> DbResult<Deposit> {
        with_retry(self.db.retry(), "complete_deposit", move || async move {
            let mut tx = self.db.pool().begin().await?;
            let deposit = complete_deposit_tx(&mut tx, deposit_id).await?;
            tx.commit().await?;
            Ok(deposit)
        })
        .await
    }

    /// Fail a pending deposit.
    pub async fn fail_deposit(&self, deposit_id: Uuid, reason: &str) -> DbResult<Deposit> {
        with_retry(self.db.retry(), "fail_deposit", move || async move {
            let mut tx = self.db.pool().begin().await?;
            let deposit = fail_deposit_tx(&mut tx, deposit_id, reason).await?;
            tx.commit().await?;
            Ok(deposit)
        })
        .await
    }

    pub async fn deposits(&self, user_id: Uuid, page: &PageQuery) -> DbResult<Vec<Deposit>> {
        let before = page.cursor().map_err(DbError::Invalid)?;
        let rows: Vec<DepositRow> = sqlx::query_as(&format!(
            "SELECT {} FROM deposits WHERE user_id = $1 \
             AND ($2::timestamptz IS NULL OR created_at < $2) \
             ORDER BY created_at DESC LIMIT $3",
            DEPOSIT_COLUMNS
        ))
        .bind(user_id)
        .bind(before)
        .bind(i64::from(page.limit()))
        .fetch_all(self.db.pool())
        .await?;
        convert_all(rows)
    }

    // =========================================================================
    // Payments
    // =========================================================================

    /// Apply a verified provider webhook.
    #[instrument(skip(self, event), fields(provider_ref = %event.provider_ref, status = ?event.status))]
    pub async fn process_webhook(&self, event: &PaymentWebhookEvent) -> DbResult<WebhookResult> {
        with_retry(self.db.retry(), "payment_webhook", move || self.process_webhook_once(event)).await
    }

    async fn process_webhook_once(&self, event: &PaymentWebhookEvent) -> DbResult<WebhookResult> {
        let mut tx = self.db.pool().begin().await?;

        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE provider_ref = $1 FOR UPDATE",
            PAYMENT_COLUMNS
        ))
        .bind(&event.provider_ref)
        .fetch_optional(&mut *tx)
        .await?;
        let payment: Payment = row
            .ok_or_else(|| DbError::not_found(format!("payment {}", event.provider_ref)))?
            .try_into()?;

        let wanted = match event.status {
            WebhookOutcome::Succeeded => PaymentStatus::Succeeded,
            WebhookOutcome::Failed => PaymentStatus::Failed,
        };

        if payment.status.is_terminal() {
            if payment.status == wanted {
                info!(payment_id = %payment.id, "Webhook replay ignored");
                return Ok(WebhookResult::AlreadyProcessed);
            }
            return Err(DbError::InvalidState(format!(
                "payment is already {}",
                payment.status
            )));
        }

        let result = match event.status {
            WebhookOutcome::Succeeded => {
                if event.amount != payment.amount {
                    return Err(DbError::invalid(format!(
                        "amount mismatch: expected {}, got {}",
                        payment.amount, event.amount
                    )));
                }
                payment.status.transition(PaymentStatus::Succeeded)?;
                complete_deposit_tx(&mut tx, payment.deposit_id).await?;
                WebhookResult::Credited
            }
            WebhookOutcome::Failed => {
                payment.status.transition(PaymentStatus::Failed)?;
                let reason = event
                    .failure_reason
                    .as_deref()
                    .unwrap_or("payment failed");
                fail_deposit_tx(&mut tx, payment.deposit_id, reason).await?;
                WebhookResult::MarkedFailed
            }
        };

        tx.commit().await?;
        info!(payment_id = %payment.id, result = ?result, "Payment webhook applied");
        Ok(result)
    }

    pub async fn payments(&self, user_id: Uuid, page: &PageQuery) -> DbResult<Vec<Payment>> {
        let before = page.cursor().map_err(DbError::Invalid)?;
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM payments WHERE user_id = $1 \
             AND ($2::timestamptz IS NULL OR created_at < $2) \
             ORDER BY created_at DESC LIMIT $3",
            PAYMENT_COLUMNS
        ))
        .bind(user_id)
        .bind(before)
        .bind(i64::from(page.limit()))
        .fetch_all(self.db.pool())
        .await?;
        convert_all(rows)
    }

    // =========================================================================
    // Withdrawals
    // =========================================================================

    /// Reserve `amount` from the balance for a payout.
    #[instrument(skip(self, request), fields(amount = request.amount))]
    pub async fn request_withdrawal(
        &self,
        user_id: Uuid,
        request: &CreateWithdrawalRequest,
    ) -> DbResult<Withdrawal> {
        validate_amount(request.amount)?;
        let destination = request.destination.trim();
        if destination.is_empty() {
            return Err(DbError::invalid("destination must not be blank"));
        }

        with_retry(self.db.retry(), "request_withdrawal", move || async move {
            let mut tx = self.db.pool().begin().await?;

            let wallet = ledger::lock_wallet(&mut tx, user_id).await?;
            if !wallet.can_spend(request.amount) {
                return Err(DbError::InsufficientFunds {
                    needed: request.amount,
                    available: wallet.balance,
                });
            }

            let row: WithdrawalRow = sqlx::query_as(&format!(
                "INSERT INTO withdrawals (id, user_id, amount, destination) \
                 VALUES ($1, $2, $3, $4) RETURNING {}",
                WITHDRAWAL_COLUMNS
            ))
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(request.amount)
            .bind(destination)
            .fetch_one(&mut *tx)
            .await?;

            let wallet = ledger::adjust(&mut tx, user_id, -request.amount, request.amount).await?;
            ledger::insert_entry(
                &mut tx,
                NewEntry {
                    user_id,
                    kind: LedgerEntryKind::Withdrawal,
                    amount: request.amount,
                    balance_after: wallet.balance,
                    counterparty_id: None,
                    reference_id: Some(row.id),
                    note: None,
                },
            )
            .await?;

            tx.commit().await?;
            info!(withdrawal_id = %row.id, user_id = %user_id, "Withdrawal requested");
            row.try_into()
        })
        .await
    }

    /// Owner cancels a pending withdrawal; held funds return to the balance.
    pub async fn cancel_withdrawal(&self, user_id: Uuid, withdrawal_id: Uuid) -> DbResult<Withdrawal> {
        self.transition_withdrawal(
            withdrawal_id,
            WithdrawalStatus::Cancelled,
            Actor::Owner(user_id),
            None,
        )
        .await
    }

    /// Admin approves a pending withdrawal for payout.
    pub async fn approve_withdrawal(&self, admin_id: Uuid, withdrawal_id: Uuid) -> DbResult<Withdrawal> {
        self.transition_withdrawal(
            withdrawal_id,
            WithdrawalStatus::Processing,
            Actor::Admin(admin_id),
            None,
        )
        .await
    }

    /// Admin marks a processing withdrawal as paid out; held funds are released.
    pub async fn complete_withdrawal(&self, admin_id: Uuid, withdrawal_id: Uuid) -> DbResult<Withdrawal> {
        self.transition_withdrawal(
            withdrawal_id,
            WithdrawalStatus::Completed,
            Actor::Admin(admin_id),
            None,
        )
        .await
    }

    /// Admin rejects a withdrawal; held funds return to the balance.
    pub async fn reject_withdrawal(
        &self,
        admin_id: Uuid,
        withdrawal_id: Uuid,
        reason: &str,
    ) -> DbResult<Withdrawal> {
        self.transition_withdrawal(
            withdrawal_id,
            WithdrawalStatus::Rejected,
            Actor::Admin(admin_id),
            Some(reason),
        )
        .await
    }

    #[instrument(skip(self, reason))]
    async fn transition_withdrawal(
        &self,
        withdrawal_id: Uuid,
        next: WithdrawalStatus,
        actor: Actor,
        reason: Option<&str>,
    ) -> DbResult<Withdrawal> {
        with_retry(self.db.retry(), "withdrawal_transition", move || async move {
            let mut tx = self.db.pool().begin().await?;

            let row: Option<WithdrawalRow> = sqlx::query_as(&format!(
                "SELECT {} FROM withdrawals WHERE id = $1 FOR UPDATE",
                WITHDRAWAL_COLUMNS
            ))
            .bind(withdrawal_id)
            .fetch_optional(&mut *tx)
            .await?;
            let withdrawal: Withdrawal = row
                .ok_or_else(|| DbError::not_found(format!("withdrawal {}", withdrawal_id)))?
                .try_into()?;

            if let Actor::Owner(user_id) = actor {
                if withdrawal.user_id != user_id {
                    return Err(DbError::forbidden("withdrawal belongs to another user"));
                }
            }

            let next = withdrawal.status.transition(next)?;

            if WithdrawalStatus::refunds_on(next) {
                ledger::lock_wallet(&mut tx, withdrawal.user_id).await?;
                let wallet =
                    ledger::adjust(&mut tx, withdrawal.user_id, withdrawal.amount, -withdrawal.amount)
                        .await?;
                ledger::insert_entry(
                    &mut tx,
                    NewEntry {
                        user_id: withdrawal.user_id,
                        kind: LedgerEntryKind::WithdrawalRefund,
                        amount: withdrawal.amount,
                        balance_after: wallet.balance,
                        counterparty_id: None,
                        reference_id: Some(withdrawal.id),
                        note: reason,
                    },
                )
                .await?;
            } else if next == WithdrawalStatus::Completed {
                // The debit was recorded at request time; only the hold goes away.
                ledger::lock_wallet(&mut tx, withdrawal.user_id).await?;
                ledger::adjust(&mut tx, withdrawal.user_id, 0, -withdrawal.amount).await?;
            }

            let reviewer = match actor {
                Actor::Admin(admin_id) => Some(admin_id),
                Actor::Owner(_) => None,
            };

            let row: WithdrawalRow = sqlx::query_as(&format!(
                "UPDATE withdrawals SET status = $2, failure_reason = COALESCE($3, failure_reason), \
                 reviewed_by = COALESCE($4, reviewed_by), updated_at = clock_timestamp() \
                 WHERE id = $1 RETURNING {}",
                WITHDRAWAL_COLUMNS
            ))
            .bind(withdrawal_id)
            .bind(next.as_str())
            .bind(reason)
            .bind(reviewer)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            info!(
                withdrawal_id = %withdrawal_id,
                from = %withdrawal.status,
                to = %next,
                "Withdrawal transitioned"
            );
            row.try_into()
        })
        .await
    }

    /// Withdrawals for one user, newest first.
    pub async fn withdrawals(&self, user_id: Uuid, page: &PageQuery) -> DbResult<Vec<Withdrawal>> {
        let before = page.cursor().map_err(DbError::Invalid)?;
        let rows: Vec<WithdrawalRow> = sqlx::query_as(&format!(
            "SELECT {} FROM withdrawals WHERE user_id = $1 \
             AND ($2::timestamptz IS NULL OR created_at < $2) \
             ORDER BY created_at DESC LIMIT $3",
            WITHDRAWAL_COLUMNS
        ))
        .bind(user_id)
        .bind(before)
        .bind(i64::from(page.limit()))
        .fetch_all(self.db.pool())
        .await?;
        convert_all(rows)
    }

    /// Admin queue, oldest first so reviews happen in request order.
    pub async fn list_withdrawals(
        &self,
        status: Option<WithdrawalStatus>,
        limit: u32,
    ) -> DbResult<Vec<Withdrawal>> {
        let rows: Vec<WithdrawalRow> = sqlx::query_as(&format!(
            "SELECT {} FROM withdrawals WHERE ($1::text IS NULL OR status = $1) \
             ORDER BY created_at ASC LIMIT $2",
            WITHDRAWAL_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(i64::from(limit))
        .fetch_all(self.db.pool())
        .await?;
        convert_all(rows)
    }
}

#[derive(Debug, Clone, Copy)]
enum Actor {
    Owner(Uuid),
    Admin(Uuid),
}

// =============================================================================
// Transaction helpers
// =============================================================================

// Deposit lock order: payment row, then deposit row, as in the webhook.
async fn lock_payment_for_deposit(tx: &mut Tx<'_>, deposit_id: Uuid) -> DbResult<()> {
    sqlx::query("SELECT id FROM payments WHERE deposit_id = $1 FOR UPDATE")
        .bind(deposit_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn lock_deposit(tx: &mut Tx<'_>, deposit_id: Uuid) -> DbResult<Deposit> {
    let row: Option<DepositRow> = sqlx::query_as(&format!(
        "SELECT {} FROM deposits WHERE id = $1 FOR UPDATE",
        DEPOSIT_COLUMNS
    ))
    .bind(deposit_id)
    .fetch_optional(&mut **tx)
    .await?;
    row.ok_or_else(|| DbError::not_found(format!("deposit {}", deposit_id)))?
        .try_into()
}

async fn set_deposit_status(
    tx: &mut Tx<'_>,
    deposit_id: Uuid,
    status: DepositStatus,
    reason: Option<&str>,
) -> DbResult<Deposit> {
    let row: DepositRow = sqlx::query_as(&format!(
        "UPDATE deposits SET status = $2, failure_reason = $3, updated_at = clock_timestamp(), \
         completed_at = CASE WHEN $2 = 'completed' THEN clock_timestamp() ELSE completed_at END \
         WHERE id = $1 RETURNING {}",
        DEPOSIT_COLUMNS
    ))
    .bind(deposit_id)
    .bind(status.as_str())
    .bind(reason)
    .fetch_one(&mut **tx)
    .await?;
    row.try_into()
}

async fn set_payment_status_for_deposit(
    tx: &mut Tx<'_>,
    deposit_id: Uuid,
    status: PaymentStatus,
    reason: Option<&str>,
) -> DbResult<()> {
    let updated = sqlx::query(
        "UPDATE payments SET status = $2, failure_reason = $3, updated_at = clock_timestamp() \
         WHERE deposit_id = $1 AND status = 'pending'",
    )
    .bind(deposit_id)
    .bind(status.as_str())
    .bind(reason)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if updated == 0 {
        warn!(deposit_id = %deposit_id, "No pending payment for deposit");
    }
    Ok(())
}

async fn complete_deposit_tx(tx: &mut Tx<'_>, deposit_id: Uuid) -> DbResult<Deposit> {
    lock_payment_for_deposit(tx, deposit_id).await?;
    let deposit = lock_deposit(tx, deposit_id).await?;
    let next = deposit.status.transition(DepositStatus::Completed)?;

    ledger::credit(tx, deposit.user_id, deposit.amount, LedgerEntryKind::Deposit, deposit.id).await?;
    let completed = set_deposit_status(tx, deposit_id, next, None).await?;
    set_payment_status_for_deposit(tx, deposit_id, PaymentStatus::Succeeded, None).await?;

    info!(deposit_id = %deposit_id, amount = deposit.amount, "Deposit credited");
    Ok(completed)
}

async fn fail_deposit_tx(tx: &mut Tx<'_>, deposit_id: Uuid, reason: &str) -> DbResult<Deposit> {
    lock_payment_for_deposit(tx, deposit_id).await?;
    let deposit = lock_deposit(tx, deposit_id).await?;
    let next = deposit.status.transition(DepositStatus::Failed)?;

    let failed = set_deposit_status(tx, deposit_id, next, Some(reason)).await?;
    set_payment_status_for_deposit(tx, deposit_id, PaymentStatus::Failed, Some(reason)).await?;

    info!(deposit_id = %deposit_id, reason = %reason, "Deposit failed");
    Ok(failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_ref_is_unique_and_prefixed() {
        let a = new_provider_ref("stripe");
        let b = new_provider_ref("stripe");
        assert!(a.starts_with("stripe_"));
        assert_ne!(a, b);
    }
}
