//! Reaction handlers.

use axum::extract::State;
use uuid::Uuid;

use pulse_models::{ReactRequest, ReactionSummary, ReactionTarget};

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::extract::{Json, Path};
use crate::state::AppState;

/// Set the caller's reaction, replacing any previous kind.
pub async fn react(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<ReactRequest>,
) -> ApiResult<Json<ReactionSummary>> {
    state.users.ensure(&user).await?;
    let summary = state
        .reactions
        .react(user.id, request.target_type, request.target_id, request.kind)
        .await?;
    Ok(Json(summary))
}

pub async fn reaction_summary(
    State(state): State<AppState>,
    user: AuthUser,
    Path((target, target_id)): Path<(ReactionTarget, Uuid)>,
) -> ApiResult<Json<ReactionSummary>> {
    let summary = state.reactions.summary(Some(user.id), target, target_id).await?;
    Ok(Json(summary))
}

pub async fn unreact(
    State(state): State<AppState>,
    user: AuthUser,
    Path((target, target_id)): Path<(ReactionTarget, Uuid)>,
) -> ApiResult<Json<ReactionSummary>> {
    let summary = state.reactions.unreact(user.id, target, target_id).await?;
    Ok(Json(summary))
}
