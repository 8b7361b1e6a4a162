//! Handlers for approver discovery and the caller's own approval queue.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::extract::AppQuery;
use crate::middleware::auth::AuthUser;
use crate::query::{MyApprovalsParams, SearchParams};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/approvers?search=
///
/// Users who may currently be chosen as approvers.
pub async fn list_approvers(
    _auth: AuthUser,
    State(state): State<AppState>,
    AppQuery(params): AppQuery<SearchParams>,
) -> AppResult<impl IntoResponse> {
    let users = state
        .engine
        .list_approvers(params.search.as_deref())
        .await?;
    Ok(Json(DataResponse { data: users }))
}

/// GET /api/v1/me/approvals?status=
///
/// Change requests on which the caller is an approver.
pub async fn list_my_approvals(
    auth: AuthUser,
    State(state): State<AppState>,
    AppQuery(params): AppQuery<MyApprovalsParams>,
) -> AppResult<impl IntoResponse> {
    let status = params.assignment_status()?;
    let items = state.engine.list_my_approvals(auth.user_id, status).await?;
    Ok(Json(DataResponse { data: items }))
}
