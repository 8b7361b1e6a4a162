//! PostgreSQL implementation of [`ChangeRequestStore`].
//!
//! State-changing operations run in a single transaction. Responses and
//! submissions lock the change request row with `SELECT ... FOR UPDATE`, load
//! its assignments, apply the pure rules from `changeflow_core::approval`, and
//! write back the result before committing. Any failure drops the transaction,
//! which rolls it back.

use async_trait::async_trait;
use changeflow_core::approval::{apply_response, apply_submission, ApproverResponse, ResponseOutcome};
use changeflow_core::change_request::{
    format_request_id, ApproverAssignment, AssignmentStatus, ChangeRequest, ChangeRequestDetail,
    ChangeRequestStatus, NewChangeRequest, RiskRating,
};
use changeflow_core::error::CoreError;
use changeflow_core::search::{ChangeRequestFilter, StatusCounts};
use changeflow_core::store::{ChangeRequestStore, Submission};
use changeflow_core::types::{DbId, Timestamp};
use chrono::Utc;
use sqlx::PgPool;

use crate::error::DbError;
use crate::models::approver::ApproverRow;
use crate::models::change_request::ChangeRequestRow;
use crate::repositories::{ApproverRepo, ChangeRequestRepo};

/// Change request persistence backed by a connection pool.
#[derive(Clone)]
pub struct PgChangeRequestStore {
    pool: PgPool,
}

impl PgChangeRequestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn create_inner(&self, input: &NewChangeRequest) -> Result<ChangeRequestDetail, DbError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let number = ChangeRequestRepo::next_request_number(&mut *tx).await?;
        let row =
            ChangeRequestRepo::create(&mut *tx, &format_request_id(number), input, now).await?;
        let approvers =
            ApproverRepo::create_pending(&mut *tx, row.id, &input.approver_ids, now).await?;

        tx.commit().await?;

        Ok(to_detail(row, approvers)?)
    }

    /// Both reads share one snapshot, so a response committing in between
    /// cannot pair a stale status with fresh assignments.
    async fn find_inner(&self, id: DbId) -> Result<Option<ChangeRequestDetail>, DbError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let Some(row) = ChangeRequestRepo::find_by_id(&mut *tx, id).await? else {
            return Ok(None);
        };
        let approvers = ApproverRepo::list_for_change_request(&mut *tx, id).await?;
        tx.commit().await?;

        Ok(Some(to_detail(row, approvers)?))
    }

    async fn record_response_inner(
        &self,
        change_request_id: DbId,
        response: &ApproverResponse,
        now: Timestamp,
    ) -> Result<(ChangeRequestDetail, ResponseOutcome), DbError> {
        let mut tx = self.pool.begin().await?;

        let Some(row) = ChangeRequestRepo::find_for_update(&mut *tx, change_request_id).await?
        else {
            return Err(CoreError::InvalidState(format!(
                "Change request {change_request_id} does not exist"
            ))
            .into());
        };
        let approvers = ApproverRepo::list_for_change_request(&mut *tx, change_request_id).await?;
        let mut detail = to_detail(row, approvers)?;

        let outcome = apply_response(&mut detail, response, now)?;

        if !ApproverRepo::record_decision(&mut *tx, &outcome.assignment).await? {
            // Only reachable if a writer skipped the row lock.
            return Err(CoreError::InvalidState("Assignment is no longer pending".into()).into());
        }
        ChangeRequestRepo::update_status(
            &mut *tx,
            change_request_id,
            detail.change_request.status,
            detail.change_request.updated_at,
        )
        .await?;

        tx.commit().await?;

        Ok((detail, outcome))
    }

    async fn submit_inner(
        &self,
        change_request_id: DbId,
        submission: &Submission,
        now: Timestamp,
    ) -> Result<ChangeRequestDetail, DbError> {
        let mut tx = self.pool.begin().await?;

        let Some(row) = ChangeRequestRepo::find_for_update(&mut *tx, change_request_id).await?
        else {
            return Err(CoreError::NotFound {
                entity: "ChangeRequest",
                id: change_request_id,
            }
            .into());
        };
        let approvers = ApproverRepo::list_for_change_request(&mut *tx, change_request_id).await?;
        let mut detail = to_detail(row, approvers)?;

        apply_submission(
            &mut detail,
            submission.caller_id,
            submission.caller_is_admin,
            &submission.additional_approvers,
            now,
        )?;

        ApproverRepo::create_pending(
            &mut *tx,
            change_request_id,
            &submission.additional_approvers,
            now,
        )
        .await?;
        ChangeRequestRepo::update_status(
            &mut *tx,
            change_request_id,
            ChangeRequestStatus::Pending,
            now,
        )
        .await?;

        tx.commit().await?;

        Ok(detail)
    }

    async fn list_inner(&self, filter: &ChangeRequestFilter) -> Result<Vec<ChangeRequest>, DbError> {
        let rows = ChangeRequestRepo::list(&self.pool, filter).await?;
        Ok(to_change_requests(rows)?)
    }

    async fn list_assigned_inner(
        &self,
        user_id: DbId,
        status: Option<AssignmentStatus>,
    ) -> Result<Vec<ChangeRequest>, DbError> {
        let rows =
            ChangeRequestRepo::list_assigned_to(&self.pool, user_id, status.map(|s| s.as_str()))
                .await?;
        Ok(to_change_requests(rows)?)
    }

    async fn status_counts_inner(&self) -> Result<StatusCounts, DbError> {
        let mut counts = StatusCounts::default();
        for (status, count) in ChangeRequestRepo::count_by_status(&self.pool).await? {
            let status: ChangeRequestStatus = status
                .parse()
                .map_err(|e| crate::error::corrupt_value("status", e))?;
            counts.add(status, count);
        }
        Ok(counts)
    }
}

fn to_detail(
    row: ChangeRequestRow,
    approvers: Vec<ApproverRow>,
) -> Result<ChangeRequestDetail, CoreError> {
    Ok(ChangeRequestDetail {
        change_request: ChangeRequest::try_from(row)?,
        approvers: approvers
            .into_iter()
            .map(ApproverAssignment::try_from)
            .collect::<Result<_, _>>()?,
    })
}

fn to_change_requests(rows: Vec<ChangeRequestRow>) -> Result<Vec<ChangeRequest>, CoreError> {
    rows.into_iter().map(ChangeRequest::try_from).collect()
}

#[async_trait]
impl ChangeRequestStore for PgChangeRequestStore {
    async fn create(&self, input: &NewChangeRequest) -> Result<ChangeRequestDetail, CoreError> {
        Ok(self.create_inner(input).await?)
    }

    async fn find(&self, id: DbId) -> Result<Option<ChangeRequestDetail>, CoreError> {
        Ok(self.find_inner(id).await?)
    }

    async fn list(&self, filter: &ChangeRequestFilter) -> Result<Vec<ChangeRequest>, CoreError> {
        Ok(self.list_inner(filter).await?)
    }

    async fn list_assigned(
        &self,
        user_id: DbId,
        status: Option<AssignmentStatus>,
    ) -> Result<Vec<ChangeRequest>, CoreError> {
        Ok(self.list_assigned_inner(user_id, status).await?)
    }

    async fn status_counts(&self) -> Result<StatusCounts, CoreError> {
        Ok(self.status_counts_inner().await?)
    }

    async fn count_by_risk(&self, risk: RiskRating) -> Result<i64, CoreError> {
        ChangeRequestRepo::count_by_risk(&self.pool, risk)
            .await
            .map_err(|e| DbError::from(e).into())
    }

    async fn record_response(
        &self,
        change_request_id: DbId,
        response: &ApproverResponse,
        now: Timestamp,
    ) -> Result<(ChangeRequestDetail, ResponseOutcome), CoreError> {
        Ok(self
            .record_response_inner(change_request_id, response, now)
            .await?)
    }

    async fn submit(
        &self,
        change_request_id: DbId,
        submission: &Submission,
        now: Timestamp,
    ) -> Result<ChangeRequestDetail, CoreError> {
        Ok(self.submit_inner(change_request_id, submission, now).await?)
    }
}
