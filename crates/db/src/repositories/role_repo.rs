//! Repository for the `roles` and `user_roles` tables.

use changeflow_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::role::UserRoleName;

/// Provides role lookups and user-role membership changes.
pub struct RoleRepo;

impl RoleRepo {
    /// Role names held by each of `user_ids`.
    pub async fn names_for_users(
        pool: &PgPool,
        user_ids: &[DbId],
    ) -> Result<Vec<UserRoleName>, sqlx::Error> {
        sqlx::query_as::<_, UserRoleName>(
            "SELECT ur.user_id, r.name
             FROM user_roles ur
             JOIN roles r ON r.id = ur.role_id
             WHERE ur.user_id = ANY($1)
             ORDER BY ur.user_id, r.name",
        )
        .bind(user_ids)
        .fetch_all(pool)
        .await
    }

    /// Grant the named role. Returns `true` if the user did not already hold it.
    pub async fn assign(
        conn: &mut PgConnection,
        user_id: DbId,
        role_name: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO user_roles (user_id, role_id)
             SELECT $1, id FROM roles WHERE name = $2
             ON CONFLICT (user_id, role_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(role_name)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove the named role. Returns `true` if the user held it.
    pub async fn revoke(
        conn: &mut PgConnection,
        user_id: DbId,
        role_name: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM user_roles
             WHERE user_id = $1
               AND role_id = (SELECT id FROM roles WHERE name = $2)",
        )
        .bind(user_id)
        .bind(role_name)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
