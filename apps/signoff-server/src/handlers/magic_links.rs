//! Magic-link endpoints: issue (authenticated), validate and submit (token only).

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use signoff_storage::{EvidenceId, EvidenceKind};
use signoff_workflow::{IssueRequest, SubmitRequest, TokenRefusal, WorkflowError};
use tracing::{info, warn};
use uuid::Uuid;

use super::{empty_object, retry_transient, ApiError, CurrentUser, EvidenceBody};
use crate::email::MagicLinkEmailContent;
use crate::metrics;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateMagicLinkRequest {
    pub evidence_id: Uuid,
    pub recipient_email: String,
    #[serde(default)]
    pub recipient_gmc: Option<String>,
    pub form_type: String,
}

#[derive(Debug, Serialize)]
pub struct CreateMagicLinkResponse {
    pub success: bool,
    pub magic_link: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

fn parse_kind(raw: &str) -> Result<EvidenceKind, WorkflowError> {
    raw.parse().map_err(|_| WorkflowError::InvalidKind)
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    body: Result<Json<CreateMagicLinkRequest>, JsonRejection>,
) -> Result<Json<CreateMagicLinkResponse>, ApiError> {
    let Json(body) = body?;
    let req = IssueRequest {
        evidence_id: EvidenceId(body.evidence_id),
        recipient_email: body.recipient_email,
        recipient_credential_id: body.recipient_gmc,
        kind: parse_kind(&body.form_type).map_err(ApiError::issuer)?,
        issuer_id: user.id,
    };

    let workflow = &state.workflow;
    let issued = retry_transient(|| workflow.issue_link(req.clone()))
        .await
        .map_err(ApiError::issuer)?;
    metrics::record_link_issued();

    let warning = match &state.mailer {
        None => Some(
            "Email delivery is not configured; share the link with the supervisor directly."
                .to_string(),
        ),
        Some(mailer) => {
            let content = MagicLinkEmailContent::new(
                issued.link.kind,
                &user.name,
                &issued.url,
                issued.link.expires_at,
            );
            match mailer
                .send_magic_link(&issued.link.recipient_email, &content)
                .await
            {
                Ok(()) => {
                    info!(evidence_id = %issued.link.evidence_id, link_id = %issued.link.id, "magic link emailed");
                    None
                }
                Err(e) => {
                    warn!(evidence_id = %issued.link.evidence_id, link_id = %issued.link.id, error = %e, "magic link email failed");
                    Some(format!(
                        "The link was created but the email could not be sent: {}",
                        e
                    ))
                }
            }
        }
    };

    Ok(Json(CreateMagicLinkResponse {
        success: true,
        magic_link: issued.url,
        token: issued.token,
        expires_at: issued.link.expires_at,
        warning,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ValidateMagicLinkRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateMagicLinkResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<TokenRefusal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<EvidenceBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_evidence: Option<Vec<EvidenceBody>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

fn recipient_body_error(rejection: JsonRejection) -> ApiError {
    ApiError::recipient(WorkflowError::InvalidRequest(rejection.body_text()))
}

/// Read-only: never consumes the link.
pub async fn validate(
    State(state): State<AppState>,
    body: Result<Json<ValidateMagicLinkRequest>, JsonRejection>,
) -> Result<Json<ValidateMagicLinkResponse>, ApiError> {
    let Json(body) = body.map_err(recipient_body_error)?;
    let workflow = &state.workflow;
    let token = body.token.as_str();
    let result = retry_transient(|| workflow.validate_link(token))
        .await
        .map_err(ApiError::recipient)?;

    if let Some(reason) = result.reason {
        metrics::record_link_refusal(reason.as_str());
    }

    let (evidence, linked_evidence) = match result.scoped_view {
        Some(view) => (
            Some(EvidenceBody::from(view.evidence)),
            Some(view.linked.into_iter().map(EvidenceBody::from).collect()),
        ),
        None => (None, None),
    };

    Ok(Json(ValidateMagicLinkResponse {
        valid: result.valid,
        reason: result.reason,
        evidence,
        linked_evidence,
        expires_at: result.expires_at,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitMagicLinkFormRequest {
    pub token: String,
    pub evidence_id: Uuid,
    #[serde(default = "empty_object")]
    pub updates: Value,
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub decline: bool,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub form_type: Option<String>,
    #[serde(default)]
    pub supervisor_name: Option<String>,
}

/// Save progress, with `complete` sign off and burn the link, or with `decline` return the
/// record to its owner.
pub async fn submit(
    State(state): State<AppState>,
    body: Result<Json<SubmitMagicLinkFormRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body.map_err(recipient_body_error)?;
    let form_type = body
        .form_type
        .as_deref()
        .map(parse_kind)
        .transpose()
        .map_err(ApiError::recipient)?;
    let req = SubmitRequest {
        token: body.token,
        evidence_id: EvidenceId(body.evidence_id),
        patch: body.updates,
        terminal: body.complete,
        decline: body.decline,
        reason: body.reason,
        form_type,
        supervisor_name: body.supervisor_name,
    };

    let workflow = &state.workflow;
    match retry_transient(|| workflow.submit_with_token(req.clone())).await {
        Ok(outcome) => {
            if outcome.consumed {
                metrics::record_signoff("magic_link");
            }
            Ok(Json(json!({ "success": true })))
        }
        Err(e) => {
            if let WorkflowError::TokenInvalid { reason } = &e {
                metrics::record_link_refusal(reason.as_str());
            }
            Err(ApiError::recipient(e))
        }
    }
}
