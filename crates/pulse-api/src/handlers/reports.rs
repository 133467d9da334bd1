//! User-facing report handlers.

use axum::extract::State;
use axum::http::StatusCode;
use tracing::info;

use pulse_models::{CreateReportRequest, Report};

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::extract::Json;
use crate::handlers::validate;
use crate::state::AppState;

pub async fn create_report(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateReportRequest>,
) -> ApiResult<(StatusCode, Json<Report>)> {
    validate(&request)?;
    state.users.ensure(&user).await?;

    let report = state.reports.create(user.id, &request).await?;
    info!(
        report_id = %report.id,
        target_type = request.target_type.as_str(),
        reason = request.reason.as_str(),
        "Report filed"
    );
    Ok((StatusCode::CREATED, Json(report)))
}

pub async fn my_reports(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<Vec<Report>>> {
    let reports = state.reports.mine(user.id).await?;
    Ok(Json(reports))
}
