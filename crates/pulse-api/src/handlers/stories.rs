//! Story handlers.

use axum::extract::State;
use axum::http::StatusCode;
use tracing::info;
use uuid::Uuid;

use pulse_models::{CreateStoryRequest, FeedStory, Story, StoryViewer};

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::extract::{Json, Path};
use crate::handlers::validate;
use crate::state::AppState;

pub async fn create_story(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateStoryRequest>,
) -> ApiResult<(StatusCode, Json<Story>)> {
    validate(&request)?;
    state.users.ensure(&user).await?;

    let story = state.stories.create(user.id, &request).await?;
    info!(story_id = %story.id, expires_at = %story.expires_at, "Posted story");
    Ok((StatusCode::CREATED, Json(story)))
}

/// Unexpired stories from followed users and the caller.
pub async fn story_feed(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<FeedStory>>> {
    let feed = state.stories.feed(user.id).await?;
    Ok(Json(feed))
}

/// Record a view. Repeat views and the author's own views are not counted.
pub async fn view_story(
    State(state): State<AppState>,
    user: AuthUser,
    Path(story_id): Path<Uuid>,
) -> ApiResult<Json<Story>> {
    state.users.ensure(&user).await?;
    let story = state.stories.view(user.id, story_id).await?;
    Ok(Json(story))
}

pub async fn story_viewers(
    State(state): State<AppState>,
    user: AuthUser,
    Path(story_id): Path<Uuid>,
) -> ApiResult<Json<Vec<StoryViewer>>> {
    let viewers = state.stories.viewers(user.id, story_id).await?;
    Ok(Json(viewers))
}

pub async fn delete_story(
    State(state): State<AppState>,
    user: AuthUser,
    Path(story_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.stories.delete(user.id, story_id).await?;
    info!(story_id = %story_id, "Deleted story");
    Ok(StatusCode::NO_CONTENT)
}
