//! Route definitions for the `/admin` resource.

use axum::routing::{get, put};
use axum::Router;

use crate::handlers::admin;
use crate::state::AppState;

/// Routes mounted at `/admin`.
///
/// All routes require the admin capability (enforced by handler extractors).
///
/// ```text
/// GET    /users                      -> list_users
/// POST   /users                      -> create_user
/// PUT    /users/{id}/approver-role   -> assign_approver_role
/// DELETE /users/{id}/approver-role   -> revoke_approver_role
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(admin::list_users).post(admin::create_user))
        .route(
            "/users/{id}/approver-role",
            put(admin::assign_approver_role).delete(admin::revoke_approver_role),
        )
}
