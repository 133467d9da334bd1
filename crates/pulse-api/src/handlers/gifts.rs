//! Gift catalog and send handlers.

use axum::extract::State;
use axum::http::StatusCode;
use tracing::info;

use pulse_models::{Gift, GiftSend, LedgerEntryKind, Page, PageQuery, SendGiftRequest};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Query};
use crate::handlers::validate;
use crate::metrics;
use crate::state::AppState;

pub async fn gift_catalog(
    State(state): State<AppState>,
    _user: AuthUser,
) -> ApiResult<Json<Vec<Gift>>> {
    let gifts = state.gifts.catalog().await?;
    Ok(Json(gifts))
}

/// Send a gift. The recipient gets the price minus the platform fee.
pub async fn send_gift(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<SendGiftRequest>,
) -> ApiResult<(StatusCode, Json<GiftSend>)> {
    validate(&request)?;
    if request.recipient_id == user.id {
        return Err(ApiError::bad_request("Cannot send a gift to yourself"));
    }

    state.users.ensure(&user).await?;
    let send = state.gifts.send(user.id, &request).await?;

    metrics::record_money_movement(LedgerEntryKind::GiftSent);
    info!(
        send_id = %send.id,
        recipient_id = %send.recipient_id,
        total = send.total_price,
        fee = send.platform_fee,
        "Gift sent"
    );
    Ok((StatusCode::CREATED, Json(send)))
}

pub async fn gifts_sent(
    State(state): State<AppState>,
    user: AuthUser,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<GiftSend>>> {
    let sends = state.gifts.sent(user.id, &page).await?;
    Ok(Json(Page::from_items(sends, page.limit(), |s| s.created_at)))
}

pub async fn gifts_received(
    State(state): State<AppState>,
    user: AuthUser,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<GiftSend>>> {
    let sends = state.gifts.received(user.id, &page).await?;
    Ok(Json(Page::from_items(sends, page.limit(), |s| s.created_at)))
}
