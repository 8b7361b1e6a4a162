//! User row model.

use changeflow_core::roles::CapabilitySet;
use changeflow_core::store::UserIdentity;
use changeflow_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: DbId,
    pub name: String,
    pub email: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    /// Attach the user's capabilities to form the workflow's view of them.
    pub fn into_identity(self, capabilities: CapabilitySet) -> UserIdentity {
        UserIdentity {
            id: self.id,
            name: self.name,
            email: self.email,
            capabilities,
            created_at: self.created_at,
        }
    }
}
