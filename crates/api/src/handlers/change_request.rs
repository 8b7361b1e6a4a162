//! Handlers for change requests and approver responses.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use changeflow_core::change_request::{
    ApproverAssignment, ChangeRequest, ChangeRequestDetail, ChangeRequestFields,
    ChangeRequestStatus, Decision,
};
use changeflow_core::store::IdentityProvider;
use changeflow_core::types::DbId;
use changeflow_core::workflow::CreateChangeRequest;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::middleware::auth::AuthUser;
use crate::query::ChangeRequestListParams;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

/// Body of `POST /change-requests`.
#[derive(Debug, Deserialize)]
pub struct CreateChangeRequestBody {
    #[serde(flatten)]
    pub fields: ChangeRequestFields,
    #[serde(default)]
    pub approver_user_ids: Vec<DbId>,
    #[serde(default)]
    pub as_draft: bool,
}

/// Body of `POST /change-requests/{id}/submit`.
#[derive(Debug, Default, Deserialize)]
pub struct SubmitBody {
    #[serde(default)]
    pub approver_user_ids: Vec<DbId>,
}

/// Body of `POST /change-requests/{id}/approvers/{user_id}/respond`.
#[derive(Debug, Deserialize)]
pub struct RespondBody {
    pub decision: Decision,
    pub comments: Option<String>,
}

// ---------------------------------------------------------------------------
// Response views
// ---------------------------------------------------------------------------

/// An assignment with the approver's display name and email.
#[derive(Debug, Serialize)]
pub struct ApproverView {
    #[serde(flatten)]
    pub assignment: ApproverAssignment,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// A change request with its enriched assignments.
#[derive(Debug, Serialize)]
pub struct ChangeRequestView {
    #[serde(flatten)]
    pub change_request: ChangeRequest,
    pub approvers: Vec<ApproverView>,
}

/// Result of recording a response.
#[derive(Debug, Serialize)]
pub struct RespondView {
    pub assignment: ApproverAssignment,
    pub previous_status: ChangeRequestStatus,
    pub status: ChangeRequestStatus,
    pub change_request: ChangeRequestView,
}

/// Attach approver names and emails from the identity collaborator.
pub(crate) async fn enrich(
    identity: &dyn IdentityProvider,
    detail: ChangeRequestDetail,
) -> AppResult<ChangeRequestView> {
    let ids: Vec<DbId> = detail.approvers.iter().map(|a| a.user_id).collect();
    let users = identity.find_users(&ids).await?;

    let approvers = detail
        .approvers
        .into_iter()
        .map(|assignment| {
            let user = users.iter().find(|u| u.id == assignment.user_id);
            ApproverView {
                name: user.map(|u| u.name.clone()),
                email: user.map(|u| u.email.clone()),
                assignment,
            }
        })
        .collect();

    Ok(ChangeRequestView {
        change_request: detail.change_request,
        approvers,
    })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/change-requests
pub async fn list_change_requests(
    _auth: AuthUser,
    State(state): State<AppState>,
    AppQuery(params): AppQuery<ChangeRequestListParams>,
) -> AppResult<impl IntoResponse> {
    let filter = params.into_filter()?;
    let items = state.engine.list_change_requests(&filter).await?;
    Ok(Json(DataResponse { data: items }))
}

/// POST /api/v1/change-requests
///
/// Creates a draft (`as_draft: true`) or a request that goes straight to review.
pub async fn create_change_request(
    auth: AuthUser,
    State(state): State<AppState>,
    AppJson(body): AppJson<CreateChangeRequestBody>,
) -> AppResult<impl IntoResponse> {
    let detail = state
        .engine
        .create_change_request(
            auth.user_id,
            CreateChangeRequest {
                fields: body.fields,
                approver_user_ids: body.approver_user_ids,
                as_draft: body.as_draft,
            },
        )
        .await?;

    tracing::info!(
        user_id = auth.user_id,
        change_request_id = detail.change_request.id,
        request_id = %detail.change_request.request_id,
        status = %detail.change_request.status,
        "Change request created"
    );

    let view = enrich(state.engine.identity(), detail).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: view })))
}

/// GET /api/v1/change-requests/{id}
pub async fn get_change_request(
    _auth: AuthUser,
    State(state): State<AppState>,
    AppPath(id): AppPath<DbId>,
) -> AppResult<impl IntoResponse> {
    let detail = state.engine.get_change_request(id).await?;
    let view = enrich(state.engine.identity(), detail).await?;
    Ok(Json(DataResponse { data: view }))
}

/// POST /api/v1/change-requests/{id}/submit
///
/// Moves a draft into review. Creator or admin only.
pub async fn submit_change_request(
    auth: AuthUser,
    State(state): State<AppState>,
    AppPath(id): AppPath<DbId>,
    AppJson(body): AppJson<SubmitBody>,
) -> AppResult<impl IntoResponse> {
    let detail = state
        .engine
        .submit_change_request(id, auth.user_id, body.approver_user_ids)
        .await?;

    tracing::info!(
        user_id = auth.user_id,
        change_request_id = id,
        approvers = detail.approvers.len(),
        "Change request submitted"
    );

    let view = enrich(state.engine.identity(), detail).await?;
    Ok(Json(DataResponse { data: view }))
}

/// POST /api/v1/change-requests/{id}/approvers/{user_id}/respond
///
/// The caller must be the assignee named in the path.
pub async fn respond(
    auth: AuthUser,
    State(state): State<AppState>,
    AppPath((id, assignee_id)): AppPath<(DbId, DbId)>,
    AppJson(body): AppJson<RespondBody>,
) -> AppResult<impl IntoResponse> {
    let recorded = state
        .engine
        .respond_to_assignment(id, assignee_id, auth.user_id, body.decision, body.comments)
        .await?;

    tracing::info!(
        user_id = auth.user_id,
        change_request_id = id,
        decision = %body.decision,
        status = %recorded.outcome.status,
        "Approver response recorded"
    );

    let change_request = enrich(state.engine.identity(), recorded.change_request).await?;
    Ok(Json(DataResponse {
        data: RespondView {
            assignment: recorded.outcome.assignment,
            previous_status: recorded.outcome.previous_status,
            status: recorded.outcome.status,
            change_request,
        },
    }))
}
