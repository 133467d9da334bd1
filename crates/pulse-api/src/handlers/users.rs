//! Profile and follow handlers.

use axum::extract::State;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use pulse_models::{
    FollowEdge, FollowState, Page, PageQuery, PublicUser, Story, Stream, UpdateProfileRequest, User,
};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Path, Query};
use crate::handlers::validate;
use crate::state::AppState;

/// Public profile plus the caller's relationship to it.
#[derive(Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: PublicUser,
    pub is_following: bool,
}

/// Get the caller's own record, creating it on first call.
pub async fn get_me(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<User>> {
    let me = state.users.ensure(&user).await?;
    Ok(Json(me))
}

/// Update display name, bio, or avatar.
pub async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    validate(&request)?;
    if request.is_empty() {
        return Err(ApiError::bad_request("No profile fields to update"));
    }

    state.users.ensure(&user).await?;
    let updated = state.users.repo().update_profile(user.id, &request).await?;

    info!(user_id = %user.id, "Updated profile");
    Ok(Json(updated))
}

/// Get another user's public profile.
pub async fn get_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<ProfileResponse>> {
    let target = state.users.repo().get(user_id).await?;
    let is_following = if user_id == user.id {
        false
    } else {
        state.users.repo().is_following(user.id, user_id).await?
    };

    Ok(Json(ProfileResponse {
        user: PublicUser::from(target),
        is_following,
    }))
}

/// Follow a user. Idempotent.
pub async fn follow_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<FollowState>> {
    if user_id == user.id {
        return Err(ApiError::bad_request("Cannot follow yourself"));
    }
    state.users.ensure(&user).await?;

    let follow = state.users.repo().follow(user.id, user_id).await?;
    Ok(Json(follow))
}

/// Unfollow a user. Idempotent.
pub async fn unfollow_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<FollowState>> {
    let follow = state.users.repo().unfollow(user.id, user_id).await?;
    Ok(Json(follow))
}

pub async fn list_followers(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(user_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<FollowEdge>>> {
    let edges = state.users.repo().followers(user_id, &page).await?;
    Ok(Json(Page::from_items(edges, page.limit(), |e| e.followed_at)))
}

pub async fn list_following(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(user_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<FollowEdge>>> {
    let edges = state.users.repo().following(user_id, &page).await?;
    Ok(Json(Page::from_items(edges, page.limit(), |e| e.followed_at)))
}

/// Streams owned by a user, newest first.
pub async fn list_user_streams(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(user_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<Stream>>> {
    let streams = state.streams.list_by_owner(user_id, &page).await?;
    Ok(Json(Page::from_items(streams, page.limit(), |s| s.created_at)))
}

/// A user's unexpired stories.
pub async fn list_user_stories(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Story>>> {
    let stories = state.stories.list_by_author(user_id).await?;
    Ok(Json(stories))
}
