//! Authenticated in-app evidence endpoints.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use signoff_storage::{EditRequestId, EvidenceId, EvidenceKind};
use signoff_workflow::WorkflowError;
use uuid::Uuid;

use super::{
    empty_object, retry_transient, ApiError, CurrentUser, EditRequestBody, EvidenceBody,
    MagicLinkBody,
};
use crate::metrics;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateEvidenceRequest {
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Result<Json<CreateEvidenceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EvidenceBody>), ApiError> {
    let Json(body) = body?;
    let kind: EvidenceKind = body
        .kind
        .parse()
        .map_err(|_| ApiError::issuer(WorkflowError::InvalidKind))?;
    let workflow = &state.workflow;
    let evidence = retry_transient(|| workflow.create_evidence(&user, kind, body.payload.clone()))
        .await
        .map_err(ApiError::issuer)?;
    Ok((StatusCode::CREATED, Json(evidence.into())))
}

/// A record with the context records linked to it.
#[derive(Debug, Serialize)]
pub struct EvidenceView {
    #[serde(flatten)]
    pub evidence: EvidenceBody,
    pub linked_evidence: Vec<EvidenceBody>,
}

pub async fn get(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<EvidenceView>, ApiError> {
    let id = EvidenceId(id);
    let workflow = &state.workflow;
    let view = retry_transient(|| workflow.get_evidence_for(&user, &id))
        .await
        .map_err(ApiError::issuer)?;
    Ok(Json(EvidenceView {
        evidence: view.evidence.into(),
        linked_evidence: view.linked.into_iter().map(EvidenceBody::from).collect(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct UpdatesRequest {
    #[serde(default = "empty_object")]
    pub updates: Value,
}

pub async fn save(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdatesRequest>, JsonRejection>,
) -> Result<Json<EvidenceBody>, ApiError> {
    let Json(body) = body?;
    let id = EvidenceId(id);
    let workflow = &state.workflow;
    let evidence = retry_transient(|| workflow.save_evidence(&user, &id, body.updates.clone()))
        .await
        .map_err(ApiError::issuer)?;
    Ok(Json(evidence.into()))
}

/// In-app sign-off by the supervisor of record. The body is optional.
pub async fn sign_off(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    body: Option<Json<UpdatesRequest>>,
) -> Result<Json<EvidenceBody>, ApiError> {
    let updates = body.map(|Json(b)| b.updates).unwrap_or_else(empty_object);
    let id = EvidenceId(id);
    let workflow = &state.workflow;
    let evidence = retry_transient(|| workflow.sign_off_evidence(&user, &id, updates.clone()))
        .await
        .map_err(ApiError::issuer)?;
    metrics::record_signoff("in_app");
    Ok(Json(evidence.into()))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeclineRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn decline(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    body: Option<Json<DeclineRequest>>,
) -> Result<Json<EvidenceBody>, ApiError> {
    let reason = body.and_then(|Json(b)| b.reason);
    let id = EvidenceId(id);
    let workflow = &state.workflow;
    let evidence = retry_transient(|| workflow.decline_evidence(&user, &id, reason.clone()))
        .await
        .map_err(ApiError::issuer)?;
    Ok(Json(evidence.into()))
}

/// Owner takes back a submission whose links have all lapsed.
pub async fn withdraw(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<EvidenceBody>, ApiError> {
    let id = EvidenceId(id);
    let workflow = &state.workflow;
    let evidence = retry_transient(|| workflow.withdraw_evidence(&user, &id))
        .await
        .map_err(ApiError::issuer)?;
    Ok(Json(evidence.into()))
}

#[derive(Debug, Deserialize)]
pub struct LinkEvidenceRequest {
    pub linked_evidence_id: Uuid,
}

pub async fn link(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    body: Result<Json<LinkEvidenceRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;
    let id = EvidenceId(id);
    let linked = EvidenceId(body.linked_evidence_id);
    let workflow = &state.workflow;
    retry_transient(|| workflow.link_evidence(&user, &id, &linked))
        .await
        .map_err(ApiError::issuer)?;
    Ok(Json(json!({ "success": true })))
}

pub async fn magic_links(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<MagicLinkBody>>, ApiError> {
    let id = EvidenceId(id);
    let workflow = &state.workflow;
    let links = retry_transient(|| workflow.list_links(&user, &id))
        .await
        .map_err(ApiError::issuer)?;
    Ok(Json(links.into_iter().map(MagicLinkBody::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct EditRequestRequest {
    pub fields: Vec<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn request_edit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    body: Result<Json<EditRequestRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EditRequestBody>), ApiError> {
    let Json(body) = body?;
    let id = EvidenceId(id);
    let workflow = &state.workflow;
    let request = retry_transient(|| {
        workflow.request_edit(&user, &id, body.fields.clone(), body.reason.clone())
    })
    .await
    .map_err(ApiError::issuer)?;
    Ok((StatusCode::CREATED, Json(request.into())))
}

pub async fn edit_requests(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<EditRequestBody>>, ApiError> {
    let id = EvidenceId(id);
    let workflow = &state.workflow;
    let requests = retry_transient(|| workflow.list_edit_requests(&user, &id))
        .await
        .map_err(ApiError::issuer)?;
    Ok(Json(requests.into_iter().map(EditRequestBody::from).collect()))
}

#[derive(Debug, Serialize)]
pub struct ApprovedEdit {
    pub edit_request: EditRequestBody,
    pub evidence: EvidenceBody,
}

pub async fn approve_edit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApprovedEdit>, ApiError> {
    let id = EditRequestId(id);
    let workflow = &state.workflow;
    let (request, evidence) = retry_transient(|| workflow.approve_edit_request(&user, &id))
        .await
        .map_err(ApiError::issuer)?;
    Ok(Json(ApprovedEdit {
        edit_request: request.into(),
        evidence: evidence.into(),
    }))
}

pub async fn deny_edit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<EditRequestBody>, ApiError> {
    let id = EditRequestId(id);
    let workflow = &state.workflow;
    let request = retry_transient(|| workflow.deny_edit_request(&user, &id))
        .await
        .map_err(ApiError::issuer)?;
    Ok(Json(request.into()))
}
