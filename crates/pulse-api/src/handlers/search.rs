//! Search handler.

use axum::extract::State;

use pulse_models::SearchQuery;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::extract::{Json, Query};
use crate::services::search::SearchResponse;
use crate::state::AppState;

/// Fuzzy search over users, streams, and stories.
pub async fn search(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<SearchResponse>> {
    let response = state.search.search(&query).await?;
    Ok(Json(response))
}
