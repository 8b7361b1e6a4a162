//! Approver assignment row model.

use changeflow_core::change_request::ApproverAssignment;
use changeflow_core::error::CoreError;
use changeflow_core::types::{DbId, Timestamp};
use sqlx::FromRow;

use crate::error::corrupt_value;

/// A row from the `change_request_approvers` table.
#[derive(Debug, Clone, FromRow)]
pub struct ApproverRow {
    pub change_request_id: DbId,
    pub user_id: DbId,
    pub status: String,
    pub responded_at: Option<Timestamp>,
    pub comments: Option<String>,
    pub created_at: Timestamp,
}

impl TryFrom<ApproverRow> for ApproverAssignment {
    type Error = CoreError;

    fn try_from(row: ApproverRow) -> Result<Self, Self::Error> {
        Ok(ApproverAssignment {
            change_request_id: row.change_request_id,
            user_id: row.user_id,
            status: row
                .status
                .parse()
                .map_err(|e| corrupt_value("status", e))?,
            responded_at: row.responded_at,
            comments: row.comments,
            created_at: row.created_at,
        })
    }
}
