//! Balance mutation primitives shared by every money-moving repository.
//!
//! All functions run inside a caller-owned transaction. Wallet rows are
//! locked `FOR UPDATE` in ascending user-id order, and every balance change
//! writes exactly one ledger entry for the affected wallet.

use sqlx::{Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use pulse_models::{Coins, FundsMovement, LedgerEntry, LedgerEntryKind, Wallet};

use crate::error::{DbError, DbResult};
use crate::metrics::record_ledger_entry;
use crate::rows::{LedgerEntryRow, WalletRow};

pub(crate) type Tx<'a> = Transaction<'a, Postgres>;

const WALLET_COLUMNS: &str = "user_id, balance, held, created_at, updated_at";

const LEDGER_COLUMNS: &str =
    "id, user_id, kind, amount, balance_after, counterparty_id, reference_id, note, created_at";

/// Create the wallet with a zero balance if it does not exist yet.
pub(crate) async fn ensure_wallet(tx: &mut Tx<'_>, user_id: Uuid) -> DbResult<()> {
    sqlx::query("INSERT INTO wallets (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            let err = DbError::from(e);
            if err.is_foreign_key_violation() {
                DbError::not_found(format!("user {}", user_id))
            } else {
                err
            }
        })?;
    Ok(())
}

/// Lock one wallet row, creating it first if needed.
pub(crate) async fn lock_wallet(tx: &mut Tx<'_>, user_id: Uuid) -> DbResult<Wallet> {
    ensure_wallet(tx, user_id).await?;
    let row: WalletRow = sqlx::query_as(&format!(
        "SELECT {} FROM wallets WHERE user_id = $1 FOR UPDATE",
        WALLET_COLUMNS
    ))
    .bind(user_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row.into())
}

/// Lock two wallets in ascending user-id order. Returns them in argument order.
pub(crate) async fn lock_pair(tx: &mut Tx<'_>, a: Uuid, b: Uuid) -> DbResult<(Wallet, Wallet)> {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    let first_wallet = lock_wallet(tx, first).await?;
    let second_wallet = lock_wallet(tx, second).await?;
    if a <= b {
        Ok((first_wallet, second_wallet))
    } else {
        Ok((second_wallet, first_wallet))
    }
}

/// Apply balance/held deltas to a locked wallet.
///
/// CHECK constraints keep both columns non-negative; callers still check
/// funds first so the common case is a 402 rather than a constraint error.
pub(crate) async fn adjust(
    tx: &mut Tx<'_>,
    user_id: Uuid,
    balance_delta: Coins,
    held_delta: Coins,
) -> DbResult<Wallet> {
    let row: WalletRow = sqlx::query_as(&format!(
        "UPDATE wallets SET balance = balance + $2, held = held + $3, updated_at = clock_timestamp() \
         WHERE user_id = $1 RETURNING {}",
        WALLET_COLUMNS
    ))
    .bind(user_id)
    .bind(balance_delta)
    .bind(held_delta)
    .fetch_one(&mut **tx)
    .await?;
    Ok(row.into())
}

/// A ledger entry about to be written.
pub(crate) struct NewEntry<'a> {
    pub user_id: Uuid,
    pub kind: LedgerEntryKind,
    /// Unsigned amount; the sign comes from `kind`.
    pub amount: Coins,
    pub balance_after: Coins,
    pub counterparty_id: Option<Uuid>,
    pub reference_id: Option<Uuid>,
    pub note: Option<&'a str>,
}

pub(crate) async fn insert_entry(tx: &mut Tx<'_>, entry: NewEntry<'_>) -> DbResult<LedgerEntry> {
    let signed = entry.kind.signed(entry.amount);
    let row: LedgerEntryRow = sqlx::query_as(&format!(
        "INSERT INTO ledger_entries \
         (id, user_id, kind, amount, balance_after, counterparty_id, reference_id, note) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
        LEDGER_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(entry.user_id)
    .bind(entry.kind.as_str())
    .bind(signed)
    .bind(entry.balance_after)
    .bind(entry.counterparty_id)
    .bind(entry.reference_id)
    .bind(entry.note)
    .fetch_one(&mut **tx)
    .await?;

    record_ledger_entry(entry.kind, signed);
    row.try_into()
}

/// Credit `amount` to a wallet's balance with one ledger entry.
pub(crate) async fn credit(
    tx: &mut Tx<'_>,
    user_id: Uuid,
    amount: Coins,
    kind: LedgerEntryKind,
    reference_id: Uuid,
) -> DbResult<(Wallet, LedgerEntry)> {
    lock_wallet(tx, user_id).await?;
    let wallet = adjust(tx, user_id, amount, 0).await?;
    let entry = insert_entry(
        tx,
        NewEntry {
            user_id,
            kind,
            amount,
            balance_after: wallet.balance,
            counterparty_id: None,
            reference_id: Some(reference_id),
            note: None,
        },
    )
    .await?;
    Ok((wallet, entry))
}

/// Move funds between two wallets: one debit, one credit, two ledger entries.
///
/// `debit` and `credit` may differ when the platform keeps a fee.
pub(crate) async fn move_funds(
    tx: &mut Tx<'_>,
    movement: &FundsMovement,
) -> DbResult<(LedgerEntry, LedgerEntry)> {
    if movement.from_user_id == movement.to_user_id {
        return Err(DbError::invalid("cannot move funds to the same wallet"));
    }
    if movement.debit <= 0 || movement.credit <= 0 || movement.credit > movement.debit {
        return Err(DbError::invalid("invalid movement amounts"));
    }

    let (from, _to) = lock_pair(tx, movement.from_user_id, movement.to_user_id).await?;
    if !from.can_spend(movement.debit) {
        return Err(DbError::InsufficientFunds {
            needed: movement.debit,
            available: from.balance,
        });
    }

    let from = adjust(tx, movement.from_user_id, -movement.debit, 0).await?;
    let out = insert_entry(
        tx,
        NewEntry {
            user_id: movement.from_user_id,
            kind: movement.debit_kind,
            amount: movement.debit,
            balance_after: from.balance,
            counterparty_id: Some(movement.to_user_id),
            reference_id: Some(movement.reference_id),
            note: movement.note.as_deref(),
        },
    )
    .await?;

    let to = adjust(tx, movement.to_user_id, movement.credit, 0).await?;
    let incoming = insert_entry(
        tx,
        NewEntry {
            user_id: movement.to_user_id,
            kind: movement.credit_kind,
            amount: movement.credit,
            balance_after: to.balance,
            counterparty_id: Some(movement.from_user_id),
            reference_id: Some(movement.reference_id),
            note: movement.note.as_deref(),
        },
    )
    .await?;

    debug!(
        from = %movement.from_user_id,
        to = %movement.to_user_id,
        debit = movement.debit,
        credit = movement.credit,
        "Moved funds"
    );

    Ok((out, incoming))
}
