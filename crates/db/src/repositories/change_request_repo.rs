//! Repository for the `change_requests` table.

use changeflow_core::change_request::{ChangeRequestStatus, NewChangeRequest, RiskRating};
use changeflow_core::search::{escape_like, ChangeRequestFilter, SortKey};
use changeflow_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::change_request::ChangeRequestRow;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, request_id, description, url_and_env, scope_and_reason, \
                        impact_analysis, risk_rating, risk_factor, \
                        risk_mitigation_with_rollback_plan, down_time, \
                        planned_maintenance_window, type_of_request, pre_checks, post_checks, \
                        status, created_by, created_at, updated_at";

fn order_by(sort: SortKey) -> &'static str {
    match sort {
        SortKey::Recent => "updated_at DESC, id DESC",
        SortKey::Created => "created_at DESC, id DESC",
        SortKey::RequestId => "length(request_id) ASC, request_id ASC",
    }
}

/// Provides persistence for change request rows.
pub struct ChangeRequestRepo;

impl ChangeRequestRepo {
    /// Draw the next request number from `change_request_number_seq`.
    pub async fn next_request_number(conn: &mut PgConnection) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT nextval('change_request_number_seq')")
            .fetch_one(conn)
            .await
    }

    /// Insert a change request row, returning it.
    pub async fn create(
        conn: &mut PgConnection,
        request_id: &str,
        input: &NewChangeRequest,
        now: Timestamp,
    ) -> Result<ChangeRequestRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO change_requests (
                request_id, description, url_and_env, scope_and_reason, impact_analysis,
                risk_rating, risk_factor, risk_mitigation_with_rollback_plan, down_time,
                planned_maintenance_window, type_of_request, pre_checks, post_checks,
                status, created_by, created_at, updated_at
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $16)
             RETURNING {COLUMNS}"
        );
        let f = &input.fields;
        sqlx::query_as::<_, ChangeRequestRow>(&query)
            .bind(request_id)
            .bind(&f.description)
            .bind(&f.url_and_env)
            .bind(&f.scope_and_reason)
            .bind(&f.impact_analysis)
            .bind(f.risk_rating.as_str())
            .bind(&f.risk_factor)
            .bind(&f.risk_mitigation_with_rollback_plan)
            .bind(&f.down_time)
            .bind(&f.planned_maintenance_window)
            .bind(f.type_of_request.as_str())
            .bind(&f.pre_checks)
            .bind(&f.post_checks)
            .bind(input.status.as_str())
            .bind(input.created_by)
            .bind(now)
            .fetch_one(conn)
            .await
    }

    /// Find a change request by internal ID.
    pub async fn find_by_id(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<ChangeRequestRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM change_requests WHERE id = $1");
        sqlx::query_as::<_, ChangeRequestRow>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Find a change request and lock its row until the transaction ends.
    ///
    /// Concurrent responders on the same change request serialize here.
    pub async fn find_for_update(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<ChangeRequestRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM change_requests WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, ChangeRequestRow>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// List change requests matching `filter`.
    pub async fn list(
        pool: &PgPool,
        filter: &ChangeRequestFilter,
    ) -> Result<Vec<ChangeRequestRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM change_requests
             WHERE ($1::text IS NULL OR status = $1)
               AND ($2::text IS NULL OR risk_rating = $2)
               AND ($3::text IS NULL OR type_of_request = $3)
               AND ($4::bigint IS NULL OR created_by = $4)
               AND ($5::text IS NULL OR request_id ILIKE $5 OR description ILIKE $5)
             ORDER BY {}
             LIMIT $6 OFFSET $7",
            order_by(filter.sort)
        );
        let pattern = filter
            .search_term()
            .map(|term| format!("%{}%", escape_like(term)));
        sqlx::query_as::<_, ChangeRequestRow>(&query)
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.risk_rating.map(|r| r.as_str()))
            .bind(filter.type_of_request.map(|t| t.as_str()))
            .bind(filter.created_by)
            .bind(pattern)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(pool)
            .await
    }

    /// Change requests on which `user_id` holds an assignment, most recent first.
    ///
    /// `assignment_status` restricts to assignments in that state.
    pub async fn list_assigned_to(
        pool: &PgPool,
        user_id: DbId,
        assignment_status: Option<&str>,
    ) -> Result<Vec<ChangeRequestRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM change_requests
             WHERE id IN (
                 SELECT change_request_id FROM change_request_approvers
                 WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
             )
             ORDER BY updated_at DESC, id DESC"
        );
        sqlx::query_as::<_, ChangeRequestRow>(&query)
            .bind(user_id)
            .bind(assignment_status)
            .fetch_all(pool)
            .await
    }

    /// Set status and `updated_at`. Returns `true` if the row was updated.
    pub async fn update_status(
        conn: &mut PgConnection,
        id: DbId,
        status: ChangeRequestStatus,
        updated_at: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE change_requests SET status = $2, updated_at = $3 WHERE id = $1")
                .bind(id)
                .bind(status.as_str())
                .bind(updated_at)
                .execute(conn)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Number of change requests per status value. Absent statuses are omitted.
    pub async fn count_by_status(pool: &PgPool) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM change_requests GROUP BY status",
        )
        .fetch_all(pool)
        .await
    }

    pub async fn count_by_risk(pool: &PgPool, risk: RiskRating) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM change_requests WHERE risk_rating = $1")
            .bind(risk.as_str())
            .fetch_one(pool)
            .await
    }
}
