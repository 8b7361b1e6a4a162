//! Collaborator interfaces consumed by the workflow engine.
//!
//! [`ChangeRequestStore`] owns persistence of change requests and their
//! assignments. Its state-changing methods are atomic: an implementation must
//! apply the rules in [`crate::approval`] and persist the result in one
//! read-modify-write (a transaction with the change request row locked, or an
//! equivalent), and must leave nothing behind when it fails.
//!
//! [`IdentityProvider`] owns users and their capability sets. The workflow only
//! reads it, except for the admin-gated capability grants.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::approval::{ApproverResponse, ResponseOutcome};
use crate::change_request::{
    AssignmentStatus, ChangeRequest, ChangeRequestDetail, NewChangeRequest, RiskRating,
};
use crate::error::CoreError;
use crate::roles::{Capability, CapabilitySet};
use crate::search::{ChangeRequestFilter, StatusCounts};
use crate::types::{DbId, Timestamp};

/// Input for moving a draft into review.
#[derive(Debug, Clone)]
pub struct Submission {
    pub caller_id: DbId,
    pub caller_is_admin: bool,
    /// Approvers to add before submitting, already checked for capability.
    pub additional_approvers: Vec<DbId>,
}

/// Persistence of change requests and approver assignments.
#[async_trait]
pub trait ChangeRequestStore: Send + Sync {
    /// Insert a change request and one Pending assignment per approver, atomically.
    async fn create(&self, input: &NewChangeRequest) -> Result<ChangeRequestDetail, CoreError>;

    /// Load a change request with all of its assignments.
    async fn find(&self, id: DbId) -> Result<Option<ChangeRequestDetail>, CoreError>;

    /// List change requests matching `filter`, sorted and paged as it requests.
    async fn list(&self, filter: &ChangeRequestFilter) -> Result<Vec<ChangeRequest>, CoreError>;

    /// Change requests on which `user_id` holds an assignment, most recent first.
    async fn list_assigned(
        &self,
        user_id: DbId,
        status: Option<AssignmentStatus>,
    ) -> Result<Vec<ChangeRequest>, CoreError>;

    async fn status_counts(&self) -> Result<StatusCounts, CoreError>;

    async fn count_by_risk(&self, risk: RiskRating) -> Result<i64, CoreError>;

    /// Apply [`crate::approval::apply_response`] and persist the assignment and
    /// the recomputed status in one atomic step.
    ///
    /// A missing change request is reported as [`CoreError::InvalidState`].
    async fn record_response(
        &self,
        change_request_id: DbId,
        response: &ApproverResponse,
        now: Timestamp,
    ) -> Result<(ChangeRequestDetail, ResponseOutcome), CoreError>;

    /// Apply [`crate::approval::apply_submission`] and persist new assignments
    /// and the Pending status in one atomic step.
    async fn submit(
        &self,
        change_request_id: DbId,
        submission: &Submission,
        now: Timestamp,
    ) -> Result<ChangeRequestDetail, CoreError>;
}

/// A user as seen by the workflow: display fields plus capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: DbId,
    pub name: String,
    pub email: String,
    pub capabilities: CapabilitySet,
    pub created_at: Timestamp,
}

/// Input for adding a user to the directory.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub capabilities: CapabilitySet,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation("name must not be empty".to_string()));
        }
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(CoreError::Validation(format!(
                "Invalid email '{}'",
                self.email
            )));
        }
        Ok(())
    }
}

/// Directory of users and their capabilities.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn find_user(&self, id: DbId) -> Result<Option<UserIdentity>, CoreError>;

    /// Users with the given ids. Unknown ids are skipped.
    async fn find_users(&self, ids: &[DbId]) -> Result<Vec<UserIdentity>, CoreError>;

    async fn users_with_capability(
        &self,
        capability: Capability,
    ) -> Result<Vec<UserIdentity>, CoreError>;

    async fn list_users(&self) -> Result<Vec<UserIdentity>, CoreError>;

    async fn create_user(&self, input: &NewUser) -> Result<UserIdentity, CoreError>;

    /// Returns `true` if the user did not already hold the capability.
    async fn grant(&self, user_id: DbId, capability: Capability) -> Result<bool, CoreError>;

    /// Returns `true` if the user held the capability.
    async fn revoke(&self, user_id: DbId, capability: Capability) -> Result<bool, CoreError>;

    /// Capabilities of `user_id` right now. Unknown users hold none.
    async fn capabilities(&self, user_id: DbId) -> Result<CapabilitySet, CoreError> {
        Ok(self
            .find_user(user_id)
            .await?
            .map(|u| u.capabilities)
            .unwrap_or_default())
    }
}
