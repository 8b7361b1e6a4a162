//! In-process implementation of both workflow collaborators.
//!
//! All state sits behind one async mutex, so every operation is trivially
//! atomic. Used by the engine tests and for running the workflow without a
//! database. [`MemoryStore::set_unavailable`] simulates a storage outage.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::approval::{apply_response, apply_submission, ApproverResponse, ResponseOutcome};
use crate::change_request::{
    format_request_id, ApproverAssignment, AssignmentStatus, ChangeRequest, ChangeRequestDetail,
    NewChangeRequest, RiskRating,
};
use crate::error::CoreError;
use crate::roles::Capability;
use crate::search::{sort_change_requests, ChangeRequestFilter, SortKey, StatusCounts};
use crate::store::{ChangeRequestStore, IdentityProvider, NewUser, Submission, UserIdentity};
use crate::types::{DbId, Timestamp};

#[derive(Default)]
struct State {
    last_change_request_id: DbId,
    last_request_number: i64,
    last_user_id: DbId,
    change_requests: BTreeMap<DbId, ChangeRequestDetail>,
    users: BTreeMap<DbId, UserIdentity>,
}

/// Change requests, assignments, and users held in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails with [`CoreError::Persistence`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), CoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CoreError::Persistence("memory store is unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChangeRequestStore for MemoryStore {
    async fn create(&self, input: &NewChangeRequest) -> Result<ChangeRequestDetail, CoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;

        state.last_change_request_id += 1;
        state.last_request_number += 1;
        let id = state.last_change_request_id;
        let now = Utc::now();

        let detail = ChangeRequestDetail {
            change_request: ChangeRequest {
                id,
                request_id: format_request_id(state.last_request_number),
                fields: input.fields.clone(),
                status: input.status,
                created_by: input.created_by,
                created_at: now,
                updated_at: now,
            },
            approvers: input
                .approver_ids
                .iter()
                .map(|user_id| ApproverAssignment::pending(id, *user_id, now))
                .collect(),
        };
        state.change_requests.insert(id, detail.clone());
        Ok(detail)
    }

    async fn find(&self, id: DbId) -> Result<Option<ChangeRequestDetail>, CoreError> {
        self.check_available()?;
        Ok(self.state.lock().await.change_requests.get(&id).cloned())
    }

    async fn list(&self, filter: &ChangeRequestFilter) -> Result<Vec<ChangeRequest>, CoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        let mut items: Vec<ChangeRequest> = state
            .change_requests
            .values()
            .map(|d| &d.change_request)
            .filter(|cr| filter.matches(cr))
            .cloned()
            .collect();
        sort_change_requests(&mut items, filter.sort);
        Ok(items
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn list_assigned(
        &self,
        user_id: DbId,
        status: Option<AssignmentStatus>,
    ) -> Result<Vec<ChangeRequest>, CoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        let mut items: Vec<ChangeRequest> = state
            .change_requests
            .values()
            .filter(|d| {
                d.assignment(user_id)
                    .is_some_and(|a| status.map_or(true, |s| s == a.status))
            })
            .map(|d| d.change_request.clone())
            .collect();
        sort_change_requests(&mut items, SortKey::Recent);
        Ok(items)
    }

    async fn status_counts(&self) -> Result<StatusCounts, CoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        let mut counts = StatusCounts::default();
        for detail in state.change_requests.values() {
            counts.add(detail.change_request.status, 1);
        }
        Ok(counts)
    }

    async fn count_by_risk(&self, risk: RiskRating) -> Result<i64, CoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .change_requests
            .values()
            .filter(|d| d.change_request.fields.risk_rating == risk)
            .count() as i64)
    }

    async fn record_response(
        &self,
        change_request_id: DbId,
        response: &ApproverResponse,
        now: Timestamp,
    ) -> Result<(ChangeRequestDetail, ResponseOutcome), CoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let detail = state
            .change_requests
            .get_mut(&change_request_id)
            .ok_or_else(|| {
                CoreError::InvalidState(format!(
                    "Change request {change_request_id} does not exist"
                ))
            })?;
        let outcome = apply_response(detail, response, now)?;
        Ok((detail.clone(), outcome))
    }

    async fn submit(
        &self,
        change_request_id: DbId,
        submission: &Submission,
        now: Timestamp,
    ) -> Result<ChangeRequestDetail, CoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let detail = state
            .change_requests
            .get_mut(&change_request_id)
            .ok_or(CoreError::NotFound {
                entity: "ChangeRequest",
                id: change_request_id,
            })?;

        // Work on a copy so a rejected submission leaves no trace.
        let mut working = detail.clone();
        apply_submission(
            &mut working,
            submission.caller_id,
            submission.caller_is_admin,
            &submission.additional_approvers,
            now,
        )?;
        *detail = working.clone();
        Ok(working)
    }
}

#[async_trait]
impl IdentityProvider for MemoryStore {
    async fn find_user(&self, id: DbId) -> Result<Option<UserIdentity>, CoreError> {
        self.check_available()?;
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn find_users(&self, ids: &[DbId]) -> Result<Vec<UserIdentity>, CoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }

    async fn users_with_capability(
        &self,
        capability: Capability,
    ) -> Result<Vec<UserIdentity>, CoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .filter(|u| u.capabilities.contains(capability))
            .cloned()
            .collect())
    }

    async fn list_users(&self) -> Result<Vec<UserIdentity>, CoreError> {
        self.check_available()?;
        Ok(self.state.lock().await.users.values().cloned().collect())
    }

    async fn create_user(&self, input: &NewUser) -> Result<UserIdentity, CoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let email = input.email.trim().to_string();
        if state
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&email))
        {
            return Err(CoreError::Conflict(format!(
                "A user with email '{email}' already exists"
            )));
        }

        state.last_user_id += 1;
        let user = UserIdentity {
            id: state.last_user_id,
            name: input.name.trim().to_string(),
            email,
            capabilities: input.capabilities.clone(),
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn grant(&self, user_id: DbId, capability: Capability) -> Result<bool, CoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let user = state.users.get_mut(&user_id).ok_or(CoreError::NotFound {
            entity: "User",
            id: user_id,
        })?;
        Ok(user.capabilities.insert(capability))
    }

    async fn revoke(&self, user_id: DbId, capability: Capability) -> Result<bool, CoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let user = state.users.get_mut(&user_id).ok_or(CoreError::NotFound {
            entity: "User",
            id: user_id,
        })?;
        Ok(user.capabilities.remove(capability))
    }
}
