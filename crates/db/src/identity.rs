//! PostgreSQL implementation of [`IdentityProvider`].
//!
//! Capabilities are the rows of `user_roles`. Role names that do not parse as
//! a [`Capability`] are ignored so they can never satisfy a guard.

use std::collections::HashMap;

use async_trait::async_trait;
use changeflow_core::error::CoreError;
use changeflow_core::roles::{Capability, CapabilitySet};
use changeflow_core::store::{IdentityProvider, NewUser, UserIdentity};
use changeflow_core::types::DbId;
use sqlx::PgPool;

use crate::error::DbError;
use crate::models::role::UserRoleName;
use crate::models::user::User;
use crate::repositories::{RoleRepo, UserRepo};

/// User directory backed by a connection pool.
#[derive(Clone)]
pub struct PgIdentityProvider {
    pool: PgPool,
}

impl PgIdentityProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach capabilities to a batch of users with one role query.
    async fn with_capabilities(&self, users: Vec<User>) -> Result<Vec<UserIdentity>, DbError> {
        let ids: Vec<DbId> = users.iter().map(|u| u.id).collect();
        let mut by_user = group_capabilities(RoleRepo::names_for_users(&self.pool, &ids).await?);
        Ok(users
            .into_iter()
            .map(|u| {
                let caps = by_user.remove(&u.id).unwrap_or_default();
                u.into_identity(caps)
            })
            .collect())
    }

    async fn find_user_inner(&self, id: DbId) -> Result<Option<UserIdentity>, DbError> {
        let Some(user) = UserRepo::find_by_id(&self.pool, id).await? else {
            return Ok(None);
        };
        Ok(self.with_capabilities(vec![user]).await?.pop())
    }

    async fn create_user_inner(&self, input: &NewUser) -> Result<UserIdentity, DbError> {
        let mut tx = self.pool.begin().await?;
        let user = UserRepo::create(&mut *tx, input.name.trim(), input.email.trim()).await?;
        for capability in input.capabilities.iter() {
            RoleRepo::assign(&mut *tx, user.id, capability.as_str()).await?;
        }
        tx.commit().await?;

        Ok(user.into_identity(input.capabilities.clone()))
    }

    async fn change_capability(
        &self,
        user_id: DbId,
        capability: Capability,
        grant: bool,
    ) -> Result<bool, DbError> {
        if UserRepo::find_by_id(&self.pool, user_id).await?.is_none() {
            return Err(CoreError::NotFound {
                entity: "User",
                id: user_id,
            }
            .into());
        }
        let mut conn = self.pool.acquire().await?;
        let changed = if grant {
            RoleRepo::assign(&mut *conn, user_id, capability.as_str()).await?
        } else {
            RoleRepo::revoke(&mut *conn, user_id, capability.as_str()).await?
        };
        if changed {
            tracing::debug!(user_id, %capability, granted = grant, "Capability changed");
        }
        Ok(changed)
    }
}

fn group_capabilities(rows: Vec<UserRoleName>) -> HashMap<DbId, CapabilitySet> {
    let mut by_user: HashMap<DbId, CapabilitySet> = HashMap::new();
    for row in rows {
        match row.name.parse::<Capability>() {
            Ok(cap) => {
                by_user.entry(row.user_id).or_default().insert(cap);
            }
            Err(_) => {
                tracing::warn!(user_id = row.user_id, role = %row.name, "Ignoring unknown role");
            }
        }
    }
    by_user
}

#[async_trait]
impl IdentityProvider for PgIdentityProvider {
    async fn find_user(&self, id: DbId) -> Result<Option<UserIdentity>, CoreError> {
        Ok(self.find_user_inner(id).await?)
    }

    async fn find_users(&self, ids: &[DbId]) -> Result<Vec<UserIdentity>, CoreError> {
        let users = UserRepo::find_by_ids(&self.pool, ids)
            .await
            .map_err(DbError::from)?;
        Ok(self.with_capabilities(users).await?)
    }

    async fn users_with_capability(
        &self,
        capability: Capability,
    ) -> Result<Vec<UserIdentity>, CoreError> {
        let users = UserRepo::list_with_role(&self.pool, capability.as_str())
            .await
            .map_err(DbError::from)?;
        Ok(self.with_capabilities(users).await?)
    }

    async fn list_users(&self) -> Result<Vec<UserIdentity>, CoreError> {
        let users = UserRepo::list(&self.pool).await.map_err(DbError::from)?;
        Ok(self.with_capabilities(users).await?)
    }

    async fn create_user(&self, input: &NewUser) -> Result<UserIdentity, CoreError> {
        Ok(self.create_user_inner(input).await?)
    }

    async fn grant(&self, user_id: DbId, capability: Capability) -> Result<bool, CoreError> {
        Ok(self.change_capability(user_id, capability, true).await?)
    }

    async fn revoke(&self, user_id: DbId, capability: Capability) -> Result<bool, CoreError> {
        Ok(self.change_capability(user_id, capability, false).await?)
    }

    async fn capabilities(&self, user_id: DbId) -> Result<CapabilitySet, CoreError> {
        let rows = RoleRepo::names_for_users(&self.pool, &[user_id])
            .await
            .map_err(DbError::from)?;
        Ok(group_capabilities(rows).remove(&user_id).unwrap_or_default())
    }
}
