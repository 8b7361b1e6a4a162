//! The change request approval workflow.
//!
//! [`WorkflowEngine`] is a thin rules layer over two collaborators: a
//! [`ChangeRequestStore`] and an [`IdentityProvider`]. Callers identify
//! themselves explicitly on every call; there is no ambient session. The engine
//! performs no retries and keeps no cache: every read is a fresh fetch and every
//! error goes straight back to the caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;

use crate::approval::{validate_approver_ids, ApproverResponse, ResponseOutcome};
use crate::change_request::{
    AssignmentStatus, ChangeRequest, ChangeRequestDetail, ChangeRequestFields,
    ChangeRequestStatus, Decision, NewChangeRequest, RiskRating,
};
use crate::error::CoreError;
use crate::roles::Capability;
use crate::search::{ChangeRequestFilter, DashboardSummary, SortKey, RECENT_LIMIT};
use crate::store::{ChangeRequestStore, IdentityProvider, NewUser, Submission, UserIdentity};
use crate::types::DbId;

/// Input for creating a change request.
#[derive(Debug, Clone)]
pub struct CreateChangeRequest {
    pub fields: ChangeRequestFields,
    pub approver_user_ids: Vec<DbId>,
    pub as_draft: bool,
}

/// A persisted response together with the change request it changed.
#[derive(Debug, Clone)]
pub struct RecordedResponse {
    pub change_request: ChangeRequestDetail,
    pub outcome: ResponseOutcome,
}

/// Entry point for every workflow operation.
#[derive(Clone)]
pub struct WorkflowEngine {
    store: Arc<dyn ChangeRequestStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn ChangeRequestStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { store, identity }
    }

    /// The identity collaborator, for callers that need display data.
    pub fn identity(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }

    // -----------------------------------------------------------------------
    // Change requests
    // -----------------------------------------------------------------------

    /// Create a change request and its initial assignments in one atomic write.
    ///
    /// Drafts need only a description and may have no approvers. Anything else
    /// needs every descriptive field and at least one approver. Each approver
    /// must hold the approver (or admin) capability right now.
    pub async fn create_change_request(
        &self,
        requester_id: DbId,
        input: CreateChangeRequest,
    ) -> Result<ChangeRequestDetail, CoreError> {
        self.require_known_user(requester_id).await?;

        if input.as_draft {
            input.fields.validate_draft()?;
        } else {
            input.fields.validate_submission()?;
            if input.approver_user_ids.is_empty() {
                return Err(CoreError::Validation(
                    "At least one approver is required unless saving as draft".to_string(),
                ));
            }
        }
        validate_approver_ids(&input.approver_user_ids)?;
        self.ensure_can_approve(&input.approver_user_ids).await?;

        let status = if input.as_draft {
            ChangeRequestStatus::Draft
        } else {
            ChangeRequestStatus::Pending
        };

        self.store
            .create(&NewChangeRequest {
                fields: input.fields,
                status,
                created_by: requester_id,
                approver_ids: input.approver_user_ids,
            })
            .await
    }

    /// Submit a draft for review, optionally adding approvers first.
    pub async fn submit_change_request(
        &self,
        change_request_id: DbId,
        caller_id: DbId,
        additional_approvers: Vec<DbId>,
    ) -> Result<ChangeRequestDetail, CoreError> {
        let capabilities = self.identity.capabilities(caller_id).await?;
        validate_approver_ids(&additional_approvers)?;
        self.ensure_can_approve(&additional_approvers).await?;

        let submission = Submission {
            caller_id,
            caller_is_admin: capabilities.is_admin(),
            additional_approvers,
        };
        self.store
            .submit(change_request_id, &submission, Utc::now())
            .await
    }

    /// Record `responder_id`'s decision on their own assignment.
    pub async fn record_approver_response(
        &self,
        change_request_id: DbId,
        responder_id: DbId,
        decision: Decision,
        comments: Option<String>,
    ) -> Result<RecordedResponse, CoreError> {
        self.respond_to_assignment(change_request_id, responder_id, responder_id, decision, comments)
            .await
    }

    /// Record a decision on the assignment owned by `assignee_id`.
    ///
    /// Fails with [`CoreError::Forbidden`] unless `responder_id` is the assignee.
    /// The assignment update and the aggregate status recompute are persisted
    /// together or not at all.
    pub async fn respond_to_assignment(
        &self,
        change_request_id: DbId,
        assignee_id: DbId,
        responder_id: DbId,
        decision: Decision,
        comments: Option<String>,
    ) -> Result<RecordedResponse, CoreError> {
        let comments = comments
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        let response = ApproverResponse {
            assignee_id,
            responder_id,
            decision,
            comments,
        };
        let (change_request, outcome) = self
            .store
            .record_response(change_request_id, &response, Utc::now())
            .await?;
        Ok(RecordedResponse {
            change_request,
            outcome,
        })
    }

    pub async fn get_change_request(&self, id: DbId) -> Result<ChangeRequestDetail, CoreError> {
        self.store.find(id).await?.ok_or(CoreError::NotFound {
            entity: "ChangeRequest",
            id,
        })
    }

    pub async fn list_change_requests(
        &self,
        filter: &ChangeRequestFilter,
    ) -> Result<Vec<ChangeRequest>, CoreError> {
        self.store.list(filter).await
    }

    /// Change requests awaiting (or answered by) `user_id`.
    pub async fn list_my_approvals(
        &self,
        user_id: DbId,
        status: Option<AssignmentStatus>,
    ) -> Result<Vec<ChangeRequest>, CoreError> {
        self.store.list_assigned(user_id, status).await
    }

    pub async fn dashboard_summary(&self) -> Result<DashboardSummary, CoreError> {
        let by_status = self.store.status_counts().await?;
        let critical = self.store.count_by_risk(RiskRating::Critical).await?;
        let recent = self
            .store
            .list(&ChangeRequestFilter {
                sort: SortKey::Recent,
                limit: RECENT_LIMIT as i64,
                ..ChangeRequestFilter::default()
            })
            .await?;

        Ok(DashboardSummary {
            total: by_status.total(),
            by_status,
            critical,
            recent,
        })
    }

    // -----------------------------------------------------------------------
    // Approvers and users
    // -----------------------------------------------------------------------

    /// Users eligible to be chosen as approvers, ordered by name.
    pub async fn list_approvers(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<UserIdentity>, CoreError> {
        let mut eligible: BTreeMap<DbId, UserIdentity> = BTreeMap::new();
        for capability in [Capability::Approver, Capability::Admin] {
            for user in self.identity.users_with_capability(capability).await? {
                eligible.entry(user.id).or_insert(user);
            }
        }

        let term = search
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());
        let mut users: Vec<UserIdentity> = eligible
            .into_values()
            .filter(|u| {
                term.as_ref().map_or(true, |t| {
                    u.name.to_lowercase().contains(t) || u.email.to_lowercase().contains(t)
                })
            })
            .collect();
        users.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(users)
    }

    /// Grant the approver capability. Admin only.
    pub async fn assign_approver_role(
        &self,
        caller_id: DbId,
        user_id: DbId,
    ) -> Result<UserIdentity, CoreError> {
        self.require_admin(caller_id).await?;
        self.identity.grant(user_id, Capability::Approver).await?;
        self.user_or_not_found(user_id).await
    }

    /// Revoke the approver capability. Admin only.
    ///
    /// Existing assignments and change request statuses are not touched.
    pub async fn revoke_approver_role(
        &self,
        caller_id: DbId,
        user_id: DbId,
    ) -> Result<UserIdentity, CoreError> {
        self.require_admin(caller_id).await?;
        self.identity.revoke(user_id, Capability::Approver).await?;
        self.user_or_not_found(user_id).await
    }

    /// Add a user to the directory. Admin only.
    pub async fn create_user(
        &self,
        caller_id: DbId,
        input: &NewUser,
    ) -> Result<UserIdentity, CoreError> {
        self.require_admin(caller_id).await?;
        input.validate()?;
        self.identity.create_user(input).await
    }

    /// List every user. Admin only.
    pub async fn list_users(&self, caller_id: DbId) -> Result<Vec<UserIdentity>, CoreError> {
        self.require_admin(caller_id).await?;
        self.identity.list_users().await
    }

    // -----------------------------------------------------------------------
    // Guards
    // -----------------------------------------------------------------------

    async fn require_admin(&self, caller_id: DbId) -> Result<(), CoreError> {
        if self.identity.capabilities(caller_id).await?.is_admin() {
            Ok(())
        } else {
            Err(CoreError::Forbidden("Admin capability required".into()))
        }
    }

    async fn require_known_user(&self, user_id: DbId) -> Result<UserIdentity, CoreError> {
        self.identity
            .find_user(user_id)
            .await?
            .ok_or_else(|| CoreError::Unauthorized(format!("Unknown user {user_id}")))
    }

    async fn user_or_not_found(&self, user_id: DbId) -> Result<UserIdentity, CoreError> {
        self.identity
            .find_user(user_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "User",
                id: user_id,
            })
    }

    /// Every id must name an existing user who may approve.
    async fn ensure_can_approve(&self, approver_ids: &[DbId]) -> Result<(), CoreError> {
        if approver_ids.is_empty() {
            return Ok(());
        }
        let users = self.identity.find_users(approver_ids).await?;
        for id in approver_ids {
            match users.iter().find(|u| u.id == *id) {
                None => {
                    return Err(CoreError::Validation(format!("User {id} does not exist")));
                }
                Some(user) if !user.capabilities.can_approve() => {
                    return Err(CoreError::Validation(format!(
                        "User {id} does not hold the approver capability"
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
