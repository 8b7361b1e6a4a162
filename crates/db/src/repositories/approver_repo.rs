//! Repository for the `change_request_approvers` table.

use changeflow_core::change_request::ApproverAssignment;
use changeflow_core::types::{DbId, Timestamp};
use sqlx::PgConnection;

use crate::models::approver::ApproverRow;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "change_request_id, user_id, status, responded_at, comments, created_at";

/// Provides persistence for approver assignments.
pub struct ApproverRepo;

impl ApproverRepo {
    /// Insert one Pending assignment per user, returning them in input order.
    pub async fn create_pending(
        conn: &mut PgConnection,
        change_request_id: DbId,
        user_ids: &[DbId],
        now: Timestamp,
    ) -> Result<Vec<ApproverRow>, sqlx::Error> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "INSERT INTO change_request_approvers (change_request_id, user_id, status, created_at)
             SELECT $1, u.user_id, 'Pending', $3
             FROM UNNEST($2::bigint[]) WITH ORDINALITY AS u(user_id, ord)
             ORDER BY u.ord
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ApproverRow>(&query)
            .bind(change_request_id)
            .bind(user_ids)
            .bind(now)
            .fetch_all(conn)
            .await
    }

    /// All assignments for a change request, oldest first.
    pub async fn list_for_change_request(
        conn: &mut PgConnection,
        change_request_id: DbId,
    ) -> Result<Vec<ApproverRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM change_request_approvers
             WHERE change_request_id = $1
             ORDER BY created_at ASC, user_id ASC"
        );
        sqlx::query_as::<_, ApproverRow>(&query)
            .bind(change_request_id)
            .fetch_all(conn)
            .await
    }

    /// Persist a decided assignment. Only rows still Pending are touched.
    ///
    /// Returns `true` if the row was updated.
    pub async fn record_decision(
        conn: &mut PgConnection,
        assignment: &ApproverAssignment,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE change_request_approvers
             SET status = $3, responded_at = $4, comments = $5
             WHERE change_request_id = $1 AND user_id = $2 AND status = 'Pending'",
        )
        .bind(assignment.change_request_id)
        .bind(assignment.user_id)
        .bind(assignment.status.as_str())
        .bind(assignment.responded_at)
        .bind(&assignment.comments)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
