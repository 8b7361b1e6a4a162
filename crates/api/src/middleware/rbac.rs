//! Capability-based access control extractors.
//!
//! Unlike the token, which only proves identity, these consult the user
//! directory on every request.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use changeflow_core::error::CoreError;
use changeflow_core::store::IdentityProvider;

use super::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

/// Requires the admin capability. Rejects with 403 Forbidden otherwise.
///
/// ```ignore
/// async fn admin_only(RequireAdmin(admin): RequireAdmin) -> AppResult<Json<()>> {
///     Ok(Json(()))
/// }
/// ```
pub struct RequireAdmin(pub AuthUser);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        let capabilities = state.engine.identity().capabilities(user.user_id).await?;
        if !capabilities.is_admin() {
            return Err(AppError::Core(CoreError::Forbidden(
                "Admin capability required".into(),
            )));
        }
        Ok(RequireAdmin(user))
    }
}
