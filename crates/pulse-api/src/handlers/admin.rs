//! Admin and moderator handlers.

use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use pulse_models::pagination::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use pulse_models::{
    CreateGiftRequest, Gift, LedgerEntryKind, RejectWithdrawalRequest, Report, ReportStatus,
    ReviewReportRequest, Withdrawal, WithdrawalStatus,
};

use crate::auth::{AdminUser, ModeratorUser};
use crate::error::ApiResult;
use crate::extract::{Json, Path, Query};
use crate::handlers::validate;
use crate::metrics;
use crate::state::AppState;

/// Queue filter for admin lists. Oldest first.
#[derive(Debug, Deserialize)]
pub struct QueueQuery<S> {
    pub status: Option<S>,
    pub limit: Option<u32>,
}

impl<S> QueueQuery<S> {
    fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT)
    }
}

// ============================================================================
// Withdrawals
// ============================================================================

pub async fn list_withdrawals(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<QueueQuery<WithdrawalStatus>>,
) -> ApiResult<Json<Vec<Withdrawal>>> {
    let withdrawals = state
        .funding
        .list_withdrawals(query.status, query.limit())
        .await?;
    Ok(Json(withdrawals))
}

/// `pending -> processing`.
pub async fn approve_withdrawal(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(withdrawal_id): Path<Uuid>,
) -> ApiResult<Json<Withdrawal>> {
    state.users.ensure(&admin).await?;
    let withdrawal = state.funding.approve_withdrawal(admin.id, withdrawal_id).await?;
    info!(withdrawal_id = %withdrawal.id, admin_id = %admin.id, "Withdrawal approved");
    Ok(Json(withdrawal))
}

/// `processing -> completed`. Releases the hold.
pub async fn complete_withdrawal(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(withdrawal_id): Path<Uuid>,
) -> ApiResult<Json<Withdrawal>> {
    state.users.ensure(&admin).await?;
    let withdrawal = state.funding.complete_withdrawal(admin.id, withdrawal_id).await?;

    metrics::record_money_movement(LedgerEntryKind::Withdrawal);
    info!(
        withdrawal_id = %withdrawal.id,
        amount = withdrawal.amount,
        admin_id = %admin.id,
        "Withdrawal completed"
    );
    Ok(Json(withdrawal))
}

/// Reject and refund the held amount.
pub async fn reject_withdrawal(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(withdrawal_id): Path<Uuid>,
    Json(request): Json<RejectWithdrawalRequest>,
) -> ApiResult<Json<Withdrawal>> {
    validate(&request)?;
    state.users.ensure(&admin).await?;

    let withdrawal = state
        .funding
        .reject_withdrawal(admin.id, withdrawal_id, &request.reason)
        .await?;

    metrics::record_money_movement(LedgerEntryKind::WithdrawalRefund);
    info!(withdrawal_id = %withdrawal.id, admin_id = %admin.id, "Withdrawal rejected");
    Ok(Json(withdrawal))
}

// ============================================================================
// Gift catalog
// ============================================================================

pub async fn create_gift(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(request): Json<CreateGiftRequest>,
) -> ApiResult<(StatusCode, Json<Gift>)> {
    validate(&request)?;
    let gift = state.gifts.create_gift(&request).await?;
    info!(gift_id = %gift.id, name = %gift.name, admin_id = %admin.id, "Added gift to catalog");
    Ok((StatusCode::CREATED, Json(gift)))
}

// ============================================================================
// Reports
// ============================================================================

pub async fn list_reports(
    State(state): State<AppState>,
    ModeratorUser(_moderator): ModeratorUser,
    Query(query): Query<QueueQuery<ReportStatus>>,
) -> ApiResult<Json<Vec<Report>>> {
    let reports = state.reports.list(query.status, query.limit()).await?;
    Ok(Json(reports))
}

pub async fn review_report(
    State(state): State<AppState>,
    ModeratorUser(moderator): ModeratorUser,
    Path(report_id): Path<Uuid>,
    Json(request): Json<ReviewReportRequest>,
) -> ApiResult<Json<Report>> {
    validate(&request)?;
    state.users.ensure(&moderator).await?;

    let report = state.reports.review(moderator.id, report_id, &request).await?;
    info!(
        report_id = %report.id,
        status = report.status.as_str(),
        moderator_id = %moderator.id,
        "Report reviewed"
    );
    Ok(Json(report))
}
