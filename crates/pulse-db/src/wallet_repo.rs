//! Wallets, the ledger, and peer-to-peer transfers.

use tracing::{info, instrument};
use uuid::Uuid;

use pulse_models::money::validate_amount;
use pulse_models::pagination::PageQuery;
use pulse_models::{FundsMovement, LedgerEntry, LedgerEntryKind, Transfer, TransferRequest, Wallet};

use crate::error::{DbError, DbResult};
use crate::ledger;
use crate::pool::Database;
use crate::retry::with_retry;
use crate::rows::{convert_all, LedgerEntryRow, TransferRow, WalletRow};

const TRANSFER_COLUMNS: &str =
    "id, from_user_id, to_user_id, amount, note, idempotency_key, created_at";

/// Result of a transfer call.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub transfer: Transfer,
    /// True when an idempotency key matched an earlier transfer and no money moved.
    pub replayed: bool,
}

/// Repository for wallets and transfers.
#[derive(Clone)]
pub struct WalletRepository {
    db: Database,
}

impl WalletRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Return the wallet, creating it with a zero balance on first access.
    pub async fn get_or_create(&self, user_id: Uuid) -> DbResult<Wallet> {
        let row: WalletRow = sqlx::query_as(
            "INSERT INTO wallets (user_id) VALUES ($1) \
             ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id \
             RETURNING user_id, balance, held, created_at, updated_at",
        )
        .bind(user_id)
        .fetch_one(self.db.pool())
        .await?;
        Ok(row.into())
    }

    /// Ledger entries for a user, newest first.
    pub async fn ledger(&self, user_id: Uuid, page: &PageQuery) -> DbResult<Vec<LedgerEntry>> {
        let before = page.cursor().map_err(DbError::Invalid)?;
        let rows: Vec<LedgerEntryRow> = sqlx::query_as(
            "SELECT id, user_id, kind, amount, balance_after, counterparty_id, reference_id, note, created_at \
             FROM ledger_entries \
             WHERE user_id = $1 AND ($2::timestamptz IS NULL OR created_at < $2) \
             ORDER BY created_at DESC, id DESC LIMIT $3",
        )
        .bind(user_id)
        .bind(before)
        .bind(i64::from(page.limit()))
        .fetch_all(self.db.pool())
        .await?;
        convert_all(rows)
    }

    /// Transfer coins to another user.
    ///
    /// Replaying the same idempotency key with the same recipient and amount
    /// returns the original transfer; any other reuse is a conflict.
    #[instrument(skip(self, request), fields(to = %request.to_user_id, amount = request.amount))]
    pub async fn transfer(&self, from: Uuid, request: &TransferRequest) -> DbResult<TransferOutcome> {
        validate_amount(request.amount)?;
        if from == request.to_user_id {
            return Err(DbError::invalid("cannot transfer to yourself"));
        }

        let result = with_retry(self.db.retry(), "transfer", move || {
            self.transfer_once(from, request)
        })
        .await;

        match result {
            // Lost a race with a concurrent request using the same key.
            Err(e) if e.is_unique_violation() && request.idempotency_key.is_some() => {
                self.replay(from, request).await
            }
            other => other,
        }
    }

    async fn transfer_once(&self, from: Uuid, request: &TransferRequest) -> DbResult<TransferOutcome> {
        let mut tx = self.db.pool().begin().await?;

        if let Some(key) = request.idempotency_key.as_deref() {
            if let Some(existing) = find_by_key(&mut tx, from, key).await? {
                return check_replay(existing, request);
            }
        }

        let recipient: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1")
            .bind(request.to_user_id)
            .fetch_optional(&mut *tx)
            .await?;
        if recipient.is_none() {
            return Err(DbError::not_found(format!("user {}", request.to_user_id)));
        }

        let transfer_id = Uuid::new_v4();
        let movement = FundsMovement::even(
            from,
            request.to_user_id,
            request.amount,
            LedgerEntryKind::TransferOut,
            LedgerEntryKind::TransferIn,
            transfer_id,
        )
        .with_note(request.note.clone());
        ledger::move_funds(&mut tx, &movement).await?;

        let row: TransferRow = sqlx::query_as(&format!(
            "INSERT INTO transfers (id, from_user_id, to_user_id, amount, note, idempotency_key) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            TRANSFER_COLUMNS
        ))
        .bind(transfer_id)
        .bind(from)
        .bind(request.to_user_id)
        .bind(request.amount)
        .bind(request.note.as_deref())
        .bind(request.idempotency_key.as_deref())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            transfer_id = %transfer_id,
            from = %from,
            to = %request.to_user_id,
            amount = request.amount,
            "Transfer completed"
        );
        Ok(TransferOutcome {
            transfer: row.into(),
            replayed: false,
        })
    }

    async fn replay(&self, from: Uuid, request: &TransferRequest) -> DbResult<TransferOutcome> {
        let key = request.idempotency_key.as_deref().unwrap_or_default();
        let mut tx = self.db.pool().begin().await?;
        let existing = find_by_key(&mut tx, from, key).await?;
        tx.commit().await?;
        match existing {
            Some(existing) => check_replay(existing, request),
            None => Err(DbError::conflict("concurrent transfer with the same idempotency key")),
        }
    }

    /// Transfers sent or received by a user, newest first.
    pub async fn transfers(&self, user_id: Uuid, page: &PageQuery) -> DbResult<Vec<Transfer>> {
        let before = page.cursor().map_err(DbError::Invalid)?;
        let rows: Vec<TransferRow> = sqlx::query_as(&format!(
            "SELECT {} FROM transfers \
             WHERE (from_user_id = $1 OR to_user_id = $1) \
               AND ($2::timestamptz IS NULL OR created_at < $2) \
             ORDER BY created_at DESC LIMIT $3",
            TRANSFER_COLUMNS
        ))
        .bind(user_id)
        .bind(before)
        .bind(i64::from(page.limit()))
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

async fn find_by_key(
    tx: &mut ledger::Tx<'_>,
    from: Uuid,
    key: &str,
) -> DbResult<Option<Transfer>> {
    let row: Option<TransferRow> = sqlx::query_as(&format!(
        "SELECT {} FROM transfers WHERE from_user_id = $1 AND idempotency_key = $2",
        TRANSFER_COLUMNS
    ))
    .bind(from)
    .bind(key)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(row.map(Into::into))
}

fn check_replay(existing: Transfer, request: &TransferRequest) -> DbResult<TransferOutcome> {
    if existing.matches_request(request) {
        info!(transfer_id = %existing.id, "Idempotent transfer replay");
        Ok(TransferOutcome {
            transfer: existing,
            replayed: true,
        })
    } else {
        Err(DbError::conflict(
            "idempotency key already used for a different transfer",
        ))
    }
}
