//! Handler for the dashboard summary.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/dashboard/summary
///
/// Totals per status, the critical-risk count, and the five most recently
/// updated change requests.
pub async fn summary(
    _auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let summary = state.engine.dashboard_summary().await?;
    Ok(Json(DataResponse { data: summary }))
}
