//! Stream and comment handlers.

use axum::extract::State;
use axum::http::StatusCode;
use tracing::info;
use uuid::Uuid;

use pulse_db::CommentModerator;
use pulse_models::{
    Comment, CreateCommentRequest, CreateStreamRequest, EditCommentRequest, Page, PageQuery,
    Stream, UpdateStreamRequest,
};

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::extract::{Json, Path, Query};
use crate::handlers::validate;
use crate::state::AppState;

// ============================================================================
// Streams
// ============================================================================

pub async fn create_stream(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateStreamRequest>,
) -> ApiResult<(StatusCode, Json<Stream>)> {
    validate(&request)?;
    state.users.ensure(&user).await?;

    let stream = state.streams.create(user.id, &request).await?;
    info!(stream_id = %stream.id, owner_id = %user.id, "Created stream");
    Ok((StatusCode::CREATED, Json(stream)))
}

/// Live streams, most watched first.
pub async fn list_live_streams(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Vec<Stream>>> {
    let streams = state.streams.list_live(page.limit()).await?;
    Ok(Json(streams))
}

pub async fn get_stream(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(stream_id): Path<Uuid>,
) -> ApiResult<Json<Stream>> {
    let stream = state.streams.get(stream_id).await?;
    Ok(Json(stream))
}

pub async fn update_stream(
    State(state): State<AppState>,
    user: AuthUser,
    Path(stream_id): Path<Uuid>,
    Json(request): Json<UpdateStreamRequest>,
) -> ApiResult<Json<Stream>> {
    validate(&request)?;
    let stream = state.streams.update(user.id, stream_id, &request).await?;
    Ok(Json(stream))
}

pub async fn go_live(
    State(state): State<AppState>,
    user: AuthUser,
    Path(stream_id): Path<Uuid>,
) -> ApiResult<Json<Stream>> {
    let stream = state.streams.go_live(user.id, stream_id).await?;
    info!(stream_id = %stream.id, "Stream is live");
    Ok(Json(stream))
}

pub async fn end_stream(
    State(state): State<AppState>,
    user: AuthUser,
    Path(stream_id): Path<Uuid>,
) -> ApiResult<Json<Stream>> {
    let stream = state.streams.end(user.id, stream_id).await?;
    info!(stream_id = %stream.id, "Stream ended");
    Ok(Json(stream))
}

// ============================================================================
// Comments
// ============================================================================

pub async fn create_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(stream_id): Path<Uuid>,
    Json(request): Json<CreateCommentRequest>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    validate(&request)?;
    state.users.ensure(&user).await?;

    let comment = state
        .streams
        .create_comment(user.id, stream_id, &request.body, request.parent_id)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

/// Top-level comments, newest first.
pub async fn list_comments(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(stream_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<Comment>>> {
    let comments = state.streams.list_comments(stream_id, &page).await?;
    Ok(Json(Page::from_items(comments, page.limit(), |c| c.created_at)))
}

pub async fn list_replies(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(comment_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Comment>>> {
    let replies = state.streams.replies(comment_id).await?;
    Ok(Json(replies))
}

pub async fn edit_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(comment_id): Path<Uuid>,
    Json(request): Json<EditCommentRequest>,
) -> ApiResult<Json<Comment>> {
    validate(&request)?;
    let comment = state.streams.edit_comment(user.id, comment_id, &request.body).await?;
    Ok(Json(comment))
}

/// Soft delete by the author, the stream owner, or staff.
pub async fn delete_comment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(comment_id): Path<Uuid>,
) -> ApiResult<Json<Comment>> {
    let actor = CommentModerator {
        user_id: user.id,
        can_moderate: user.role.can_moderate(),
    };
    let comment = state.streams.delete_comment(actor, comment_id).await?;
    info!(comment_id = %comment.id, actor = %user.id, "Deleted comment");
    Ok(Json(comment))
}
