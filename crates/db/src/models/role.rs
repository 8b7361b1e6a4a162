//! Role membership rows.

use changeflow_core::types::DbId;
use sqlx::FromRow;

/// One `(user_id, role name)` pair from `user_roles` joined to `roles`.
#[derive(Debug, Clone, FromRow)]
pub struct UserRoleName {
    pub user_id: DbId,
    pub name: String,
}
