//! Approval rules: aggregate status and the legal transitions of a change request.
//!
//! Every function here is pure. Storage implementations call them inside a
//! single atomic read-modify-write so the stored CR status can never drift from
//! its assignment set.
//!
//! ```text
//! Draft   --(submit with >=1 approver)--> Pending
//! Pending --(any assignment Rejected)---> Rejected   terminal
//! Pending --(all assignments Approved)--> Approved   terminal
//! Pending --(otherwise)-----------------> Pending
//! ```

use std::collections::HashSet;

use crate::change_request::{
    ApproverAssignment, AssignmentStatus, ChangeRequestDetail, ChangeRequestStatus, Decision,
    MAX_COMMENT_LENGTH,
};
use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

/// Derive a change request's status from its assignments.
///
/// A draft stays a draft regardless of its (not yet actionable) assignments.
/// Otherwise the first rejection is final, unanimous approval approves, and
/// anything else is still pending. An empty assignment set never approves.
pub fn aggregate_status(
    current: ChangeRequestStatus,
    assignments: &[ApproverAssignment],
) -> ChangeRequestStatus {
    if current == ChangeRequestStatus::Draft {
        return ChangeRequestStatus::Draft;
    }
    if assignments
        .iter()
        .any(|a| a.status == AssignmentStatus::Rejected)
    {
        return ChangeRequestStatus::Rejected;
    }
    if !assignments.is_empty()
        && assignments
            .iter()
            .all(|a| a.status == AssignmentStatus::Approved)
    {
        return ChangeRequestStatus::Approved;
    }
    ChangeRequestStatus::Pending
}

/// Reject approver lists that name the same user twice.
pub fn validate_approver_ids(approver_ids: &[DbId]) -> Result<(), CoreError> {
    let mut seen = HashSet::with_capacity(approver_ids.len());
    for id in approver_ids {
        if !seen.insert(*id) {
            return Err(CoreError::Validation(format!(
                "Approver {id} is listed more than once"
            )));
        }
    }
    Ok(())
}

/// Validate an optional response comment.
pub fn validate_comments(comments: Option<&str>) -> Result<(), CoreError> {
    if let Some(c) = comments {
        if c.chars().count() > MAX_COMMENT_LENGTH {
            return Err(CoreError::Validation(format!(
                "Comments exceed maximum length of {MAX_COMMENT_LENGTH} characters"
            )));
        }
    }
    Ok(())
}

/// An approver's response to one assignment.
#[derive(Debug, Clone)]
pub struct ApproverResponse {
    /// Owner of the assignment being answered.
    pub assignee_id: DbId,
    /// The user actually making the call.
    pub responder_id: DbId,
    pub decision: Decision,
    pub comments: Option<String>,
}

/// Result of applying a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseOutcome {
    pub assignment: ApproverAssignment,
    pub previous_status: ChangeRequestStatus,
    pub status: ChangeRequestStatus,
}

impl ResponseOutcome {
    pub fn status_changed(&self) -> bool {
        self.previous_status != self.status
    }
}

/// Record a response on `detail` and recompute its aggregate status.
///
/// On error `detail` is left untouched.
pub fn apply_response(
    detail: &mut ChangeRequestDetail,
    response: &ApproverResponse,
    now: Timestamp,
) -> Result<ResponseOutcome, CoreError> {
    validate_comments(response.comments.as_deref())?;

    let request_id = detail.change_request.request_id.clone();
    let cr_status = detail.change_request.status;

    let assignment = detail.assignment(response.assignee_id).ok_or_else(|| {
        CoreError::InvalidState(format!(
            "User {} has no approver assignment on {request_id}",
            response.assignee_id
        ))
    })?;

    if assignment.user_id != response.responder_id {
        return Err(CoreError::Forbidden(format!(
            "User {} may not respond on behalf of user {}",
            response.responder_id, assignment.user_id
        )));
    }

    if cr_status != ChangeRequestStatus::Pending {
        return Err(CoreError::InvalidState(format!(
            "{request_id} is {cr_status} and does not accept responses"
        )));
    }

    if assignment.status != AssignmentStatus::Pending {
        return Err(CoreError::InvalidState(format!(
            "User {} already responded {} on {request_id}",
            assignment.user_id, assignment.status
        )));
    }

    let assignment = detail
        .assignment_mut(response.assignee_id)
        .ok_or_else(|| CoreError::Internal("assignment vanished during update".into()))?;
    assignment.status = response.decision.into();
    assignment.responded_at = Some(now);
    assignment.comments = response.comments.clone();
    let updated = assignment.clone();

    let status = aggregate_status(cr_status, &detail.approvers);
    detail.change_request.status = status;
    detail.change_request.updated_at = now;

    Ok(ResponseOutcome {
        assignment: updated,
        previous_status: cr_status,
        status,
    })
}

/// Move a draft into review, adding `additional_approvers` first.
///
/// Callers verify that `additional_approvers` hold an approving capability
/// beforehand. Only the creator or an admin may submit.
pub fn apply_submission(
    detail: &mut ChangeRequestDetail,
    caller_id: DbId,
    caller_is_admin: bool,
    additional_approvers: &[DbId],
    now: Timestamp,
) -> Result<(), CoreError> {
    let cr = &detail.change_request;

    if cr.created_by != caller_id && !caller_is_admin {
        return Err(CoreError::Forbidden(format!(
            "Only the creator of {} or an admin may submit it",
            cr.request_id
        )));
    }

    if cr.status != ChangeRequestStatus::Draft {
        return Err(CoreError::InvalidState(format!(
            "{} is {} and cannot be submitted",
            cr.request_id, cr.status
        )));
    }

    validate_approver_ids(additional_approvers)?;
    if let Some(existing) = additional_approvers
        .iter()
        .find(|id| detail.assignment(**id).is_some())
    {
        return Err(CoreError::Validation(format!(
            "User {existing} is already an approver on {}",
            cr.request_id
        )));
    }

    if detail.approvers.is_empty() && additional_approvers.is_empty() {
        return Err(CoreError::Validation(
            "At least one approver is required to submit a change request".to_string(),
        ));
    }

    cr.fields.validate_submission()?;

    let cr_id = cr.id;
    detail.approvers.extend(
        additional_approvers
            .iter()
            .map(|user_id| ApproverAssignment::pending(cr_id, *user_id, now)),
    );
    detail.change_request.status = ChangeRequestStatus::Pending;
    detail.change_request.updated_at = now;
    Ok(())
}

/* --------------------------------------------------------------------------
Tests
-------------------------------------------------------------------------- */
