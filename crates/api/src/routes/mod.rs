pub mod admin;
pub mod change_request;
pub mod health;

use axum::routing::get;
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /change-requests                                   list, create
/// /change-requests/{id}                              get
/// /change-requests/{id}/submit                       submit draft (POST)
/// /change-requests/{id}/approvers/{user_id}/respond  approve or reject (POST)
///
/// /dashboard/summary                                 status counts, recent
/// /approvers                                         eligible approvers (?search=)
/// /me/approvals                                      caller's queue (?status=)
///
/// /admin/users                                       list, create (admin only)
/// /admin/users/{id}/approver-role                    grant (PUT), revoke (DELETE)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/change-requests", change_request::router())
        .route("/dashboard/summary", get(handlers::dashboard::summary))
        .route("/approvers", get(handlers::approver::list_approvers))
        .route("/me/approvals", get(handlers::approver::list_my_approvals))
        .nest("/admin", admin::router())
}
