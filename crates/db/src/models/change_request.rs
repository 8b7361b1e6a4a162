//! Change request row model.

use changeflow_core::change_request::{ChangeRequest, ChangeRequestFields};
use changeflow_core::error::CoreError;
use changeflow_core::types::{DbId, Timestamp};
use sqlx::FromRow;

use crate::error::corrupt_value;

/// A row from the `change_requests` table.
#[derive(Debug, Clone, FromRow)]
pub struct ChangeRequestRow {
    pub id: DbId,
    pub request_id: String,
    pub description: String,
    pub url_and_env: String,
    pub scope_and_reason: String,
    pub impact_analysis: String,
    pub risk_rating: String,
    pub risk_factor: String,
    pub risk_mitigation_with_rollback_plan: String,
    pub down_time: String,
    pub planned_maintenance_window: String,
    pub type_of_request: String,
    pub pre_checks: String,
    pub post_checks: String,
    pub status: String,
    pub created_by: DbId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<ChangeRequestRow> for ChangeRequest {
    type Error = CoreError;

    fn try_from(row: ChangeRequestRow) -> Result<Self, Self::Error> {
        Ok(ChangeRequest {
            id: row.id,
            request_id: row.request_id,
            fields: ChangeRequestFields {
                description: row.description,
                url_and_env: row.url_and_env,
                scope_and_reason: row.scope_and_reason,
                impact_analysis: row.impact_analysis,
                risk_rating: row
                    .risk_rating
                    .parse()
                    .map_err(|e| corrupt_value("risk_rating", e))?,
                risk_factor: row.risk_factor,
                risk_mitigation_with_rollback_plan: row.risk_mitigation_with_rollback_plan,
                down_time: row.down_time,
                planned_maintenance_window: row.planned_maintenance_window,
                type_of_request: row
                    .type_of_request
                    .parse()
                    .map_err(|e| corrupt_value("type_of_request", e))?,
                pre_checks: row.pre_checks,
                post_checks: row.post_checks,
            },
            status: row
                .status
                .parse()
                .map_err(|e| corrupt_value("status", e))?,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
