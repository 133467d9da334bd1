//! Creator tier and subscription handlers.

use axum::extract::State;
use axum::http::StatusCode;
use tracing::info;
use uuid::Uuid;

use pulse_models::{
    CreateTierRequest, LedgerEntryKind, SubscribeRequest, Subscription, SubscriptionTier,
};

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::extract::{Json, Path};
use crate::handlers::validate;
use crate::metrics;
use crate::state::AppState;

/// Create a tier owned by the caller.
pub async fn create_tier(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateTierRequest>,
) -> ApiResult<(StatusCode, Json<SubscriptionTier>)> {
    validate(&request)?;
    state.users.ensure(&user).await?;

    let tier = state.subscriptions.create_tier(user.id, &request).await?;
    info!(tier_id = %tier.id, price = tier.price, period_days = tier.period_days, "Created tier");
    Ok((StatusCode::CREATED, Json(tier)))
}

/// Stop offering a tier. Existing subscriptions expire at renewal.
pub async fn deactivate_tier(
    State(state): State<AppState>,
    user: AuthUser,
    Path(tier_id): Path<Uuid>,
) -> ApiResult<Json<SubscriptionTier>> {
    let tier = state.subscriptions.deactivate_tier(user.id, tier_id).await?;
    Ok(Json(tier))
}

pub async fn list_creator_tiers(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(creator_id): Path<Uuid>,
) -> ApiResult<Json<Vec<SubscriptionTier>>> {
    let tiers = state.subscriptions.list_tiers(creator_id).await?;
    Ok(Json(tiers))
}

/// Subscribe to a tier, charging the first period up front.
pub async fn subscribe(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<SubscribeRequest>,
) -> ApiResult<(StatusCode, Json<Subscription>)> {
    state.users.ensure(&user).await?;

    let subscription = state.subscriptions.subscribe(user.id, request.tier_id).await?;

    metrics::record_money_movement(LedgerEntryKind::SubscriptionCharge);
    info!(
        subscription_id = %subscription.id,
        creator_id = %subscription.creator_id,
        price = subscription.price,
        "Subscribed"
    );
    Ok((StatusCode::CREATED, Json(subscription)))
}

pub async fn list_my_subscriptions(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<Subscription>>> {
    let subscriptions = state.subscriptions.list_mine(user.id).await?;
    Ok(Json(subscriptions))
}

/// Subscriptions to the caller's tiers.
pub async fn list_subscribers(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<Subscription>>> {
    let subscriptions = state.subscriptions.list_subscribers(user.id).await?;
    Ok(Json(subscriptions))
}

/// Stop auto-renewal. Access continues until the period ends.
pub async fn cancel_subscription(
    State(state): State<AppState>,
    user: AuthUser,
    Path(subscription_id): Path<Uuid>,
) -> ApiResult<Json<Subscription>> {
    let subscription = state.subscriptions.cancel(user.id, subscription_id).await?;
    Ok(Json(subscription))
}

pub async fn resume_subscription(
    State(state): State<AppState>,
    user: AuthUser,
    Path(subscription_id): Path<Uuid>,
) -> ApiResult<Json<Subscription>> {
    let subscription = state.subscriptions.resume(user.id, subscription_id).await?;
    Ok(Json(subscription))
}
