//! Admin-only user management handlers.
//!
//! Every handler takes [`RequireAdmin`]; the engine re-checks the capability
//! against the same directory.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use changeflow_core::store::NewUser;
use changeflow_core::types::DbId;

use crate::error::AppResult;
use crate::extract::{AppJson, AppPath};
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/admin/users
pub async fn list_users(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let users = state.engine.list_users(admin.user_id).await?;
    Ok(Json(DataResponse { data: users }))
}

/// POST /api/v1/admin/users
pub async fn create_user(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    AppJson(input): AppJson<NewUser>,
) -> AppResult<impl IntoResponse> {
    let user = state.engine.create_user(admin.user_id, &input).await?;

    tracing::info!(
        admin_id = admin.user_id,
        user_id = user.id,
        email = %user.email,
        "User created"
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: user })))
}

/// PUT /api/v1/admin/users/{id}/approver-role
pub async fn assign_approver_role(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    AppPath(user_id): AppPath<DbId>,
) -> AppResult<impl IntoResponse> {
    let user = state
        .engine
        .assign_approver_role(admin.user_id, user_id)
        .await?;

    tracing::info!(admin_id = admin.user_id, user_id, "Approver role assigned");

    Ok(Json(DataResponse { data: user }))
}

/// DELETE /api/v1/admin/users/{id}/approver-role
///
/// Existing assignments held by the user are left as they are.
pub async fn revoke_approver_role(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    AppPath(user_id): AppPath<DbId>,
) -> AppResult<impl IntoResponse> {
    let user = state
        .engine
        .revoke_approver_role(admin.user_id, user_id)
        .await?;

    tracing::info!(admin_id = admin.user_id, user_id, "Approver role revoked");

    Ok(Json(DataResponse { data: user }))
}
