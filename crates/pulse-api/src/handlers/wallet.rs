//! Wallet, transfer, deposit, withdrawal, and payment handlers.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use pulse_models::{
    CreateDepositRequest, CreateWithdrawalRequest, Deposit, DepositIntent, LedgerEntry,
    LedgerEntryKind, Page, PageQuery, Payment, PaymentWebhookEvent, Transfer, TransferRequest,
    Wallet, WebhookResult, Withdrawal,
};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Path, Query};
use crate::handlers::validate;
use crate::metrics;
use crate::security::{verify_signature, SIGNATURE_HEADER};
use crate::state::AppState;

// ============================================================================
// Wallet
// ============================================================================

pub async fn get_wallet(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<Wallet>> {
    state.users.ensure(&user).await?;
    let wallet = state.wallets.get_or_create(user.id).await?;
    Ok(Json(wallet))
}

pub async fn list_ledger(
    State(state): State<AppState>,
    user: AuthUser,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<LedgerEntry>>> {
    let entries = state.wallets.ledger(user.id, &page).await?;
    Ok(Json(Page::from_items(entries, page.limit(), |e| e.created_at)))
}

/// Move coins to another user.
///
/// Replaying an idempotency key with the same body returns the original
/// transfer; a different body is rejected with 409.
pub async fn create_transfer(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<TransferRequest>,
) -> ApiResult<(StatusCode, Json<Transfer>)> {
    validate(&request)?;
    if request.to_user_id == user.id {
        return Err(ApiError::bad_request("Cannot transfer to yourself"));
    }

    state.users.ensure(&user).await?;
    let outcome = state.wallets.transfer(user.id, &request).await?;

    if !outcome.replayed {
        metrics::record_money_movement(LedgerEntryKind::TransferOut);
    }
    Ok((StatusCode::CREATED, Json(outcome.transfer)))
}

pub async fn list_transfers(
    State(state): State<AppState>,
    user: AuthUser,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<Transfer>>> {
    let transfers = state.wallets.transfers(user.id, &page).await?;
    Ok(Json(Page::from_items(transfers, page.limit(), |t| t.created_at)))
}

// ============================================================================
// Deposits
// ============================================================================

/// Open a deposit and its pending payment. Coins arrive via the webhook.
pub async fn create_deposit(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateDepositRequest>,
) -> ApiResult<(StatusCode, Json<DepositIntent>)> {
    validate(&request)?;
    state.users.ensure(&user).await?;

    let intent = state.funding.create_deposit(user.id, &request).await?;
    info!(
        deposit_id = %intent.deposit.id,
        provider_ref = %intent.payment.provider_ref,
        amount = intent.deposit.amount,
        "Deposit opened"
    );
    Ok((StatusCode::CREATED, Json(intent)))
}

pub async fn cancel_deposit(
    State(state): State<AppState>,
    user: AuthUser,
    Path(deposit_id): Path<Uuid>,
) -> ApiResult<Json<Deposit>> {
    let deposit = state.funding.cancel_deposit(user.id, deposit_id).await?;
    Ok(Json(deposit))
}

pub async fn list_deposits(
    State(state): State<AppState>,
    user: AuthUser,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<Deposit>>> {
    let deposits = state.funding.deposits(user.id, &page).await?;
    Ok(Json(Page::from_items(deposits, page.limit(), |d| d.created_at)))
}

// ============================================================================
// Withdrawals
// ============================================================================

/// Request a payout. The amount is held until an admin settles it.
pub async fn create_withdrawal(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateWithdrawalRequest>,
) -> ApiResult<(StatusCode, Json<Withdrawal>)> {
    validate(&request)?;
    state.users.ensure(&user).await?;

    let withdrawal = state.funding.request_withdrawal(user.id, &request).await?;
    info!(withdrawal_id = %withdrawal.id, amount = withdrawal.amount, "Withdrawal requested");
    Ok((StatusCode::CREATED, Json(withdrawal)))
}

pub async fn cancel_withdrawal(
    State(state): State<AppState>,
    user: AuthUser,
    Path(withdrawal_id): Path<Uuid>,
) -> ApiResult<Json<Withdrawal>> {
    let withdrawal = state.funding.cancel_withdrawal(user.id, withdrawal_id).await?;
    Ok(Json(withdrawal))
}

pub async fn list_withdrawals(
    State(state): State<AppState>,
    user: AuthUser,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<Withdrawal>>> {
    let withdrawals = state.funding.withdrawals(user.id, &page).await?;
    Ok(Json(Page::from_items(withdrawals, page.limit(), |w| w.created_at)))
}

// ============================================================================
// Payments
// ============================================================================

pub async fn list_payments(
    State(state): State<AppState>,
    user: AuthUser,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<Payment>>> {
    let payments = state.funding.payments(user.id, &page).await?;
    Ok(Json(Page::from_items(payments, page.limit(), |p| p.created_at)))
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub status: WebhookResult,
}

/// Provider callback. The signature covers the raw body, so it is checked
/// before the JSON is parsed.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookResponse>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    if let Err(e) = verify_signature(&state.config.payment_webhook_secret, &body, signature) {
        warn!("Rejected payment webhook with bad signature");
        metrics::record_webhook("bad_signature");
        return Err(e);
    }

    let event: PaymentWebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid webhook payload: {}", e)))?;

    let result = state.funding.process_webhook(&event).await?;

    let label = match result {
        WebhookResult::Credited => {
            metrics::record_money_movement(LedgerEntryKind::Deposit);
            "credited"
        }
        WebhookResult::MarkedFailed => "marked_failed",
        WebhookResult::AlreadyProcessed => "already_processed",
    };
    metrics::record_webhook(label);
    info!(provider_ref = %event.provider_ref, result = label, "Processed payment webhook");

    Ok(Json(WebhookResponse { status: result }))
}
