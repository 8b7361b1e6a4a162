//! Route definitions for the `/change-requests` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::change_request;
use crate::state::AppState;

/// Routes mounted at `/change-requests`.
///
/// ```text
/// GET    /                                  -> list_change_requests
/// POST   /                                  -> create_change_request
/// GET    /{id}                              -> get_change_request
/// POST   /{id}/submit                       -> submit_change_request
/// POST   /{id}/approvers/{user_id}/respond  -> respond
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(change_request::list_change_requests).post(change_request::create_change_request),
        )
        .route("/{id}", get(change_request::get_change_request))
        .route("/{id}/submit", post(change_request::submit_change_request))
        .route(
            "/{id}/approvers/{user_id}/respond",
            post(change_request::respond),
        )
}
