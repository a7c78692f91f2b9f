//! HTTP handlers.
//!
//! - magic_links: create, validate, submit (token holders)
//! - evidence: the authenticated in-app path and amendment requests

pub mod evidence;
pub mod magic_links;

use std::future::Future;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use signoff_storage::{
    EditRequest, Evidence, EvidenceKind, EvidenceStatus, MagicLink, SupervisorIdentity, User,
};
use signoff_workflow::WorkflowError;
use tracing::{error, warn};
use uuid::Uuid;

use crate::server::AppState;

/// Run a workflow call, retrying once if it failed on transient storage.
pub async fn retry_transient<T, F, Fut>(mut op: F) -> Result<T, WorkflowError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, WorkflowError>>,
{
    match op().await {
        Err(e) if e.is_retryable() => {
            warn!(error = %e, "transient storage failure, retrying");
            op().await
        }
        other => other,
    }
}

/// Who the error body is written for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Audience {
    /// Authenticated issuers and in-app users: typed code plus message.
    Issuer,
    /// Magic-link recipients: plain language only.
    Recipient,
}

#[derive(Debug)]
pub struct ApiError {
    pub error: WorkflowError,
    pub audience: Audience,
}

impl ApiError {
    pub fn issuer(error: WorkflowError) -> Self {
        Self {
            error,
            audience: Audience::Issuer,
        }
    }

    pub fn recipient(error: WorkflowError) -> Self {
        Self {
            error,
            audience: Audience::Recipient,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match &self.error {
            WorkflowError::Unauthorized | WorkflowError::TokenInvalid { .. } => {
                StatusCode::UNAUTHORIZED
            }
            WorkflowError::RecordNotFound => StatusCode::NOT_FOUND,
            WorkflowError::TransientStorage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            WorkflowError::InvalidKind
            | WorkflowError::RecordMismatch
            | WorkflowError::IllegalTransition { .. }
            | WorkflowError::AlreadySignedOff
            | WorkflowError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::issuer(WorkflowError::InvalidRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.error.code(), error = %self.error, "request failed");
        }
        let body = match self.audience {
            Audience::Issuer => json!({
                "success": false,
                "error": self.error.to_string(),
                "code": self.error.code(),
            }),
            Audience::Recipient => json!({
                "success": false,
                "error": self.error.user_message(),
            }),
        };
        (status, Json(body)).into_response()
    }
}

/// The account behind `Authorization: Bearer <session>`.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let bearer = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::issuer(WorkflowError::Unauthorized))?;
        let user = retry_transient(move || state.workflow.authenticate(bearer))
            .await
            .map_err(ApiError::issuer)?;
        Ok(CurrentUser(user))
    }
}

pub(crate) fn empty_object() -> Value {
    json!({})
}

#[derive(Debug, Serialize)]
pub struct EvidenceBody {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub kind: EvidenceKind,
    pub status: EvidenceStatus,
    pub payload: Value,
    pub supervisor: Option<SupervisorIdentity>,
    pub signed_off_at: Option<DateTime<Utc>>,
    pub unlocked_fields: Vec<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Evidence> for EvidenceBody {
    fn from(e: Evidence) -> Self {
        Self {
            id: e.id.0,
            owner_id: e.owner_id.0,
            kind: e.kind,
            status: e.status,
            payload: e.payload,
            supervisor: e.supervisor,
            signed_off_at: e.signed_off_at,
            unlocked_fields: e.unlocked_fields,
            version: e.version,
            created_at: e.created_at,
            updated_at: e.updated_at,
        }
    }
}

/// Issuer support view of a link. The token hash is never returned.
#[derive(Debug, Serialize)]
pub struct MagicLinkBody {
    pub id: Uuid,
    pub evidence_id: Uuid,
    pub recipient_email: String,
    pub recipient_gmc: Option<String>,
    pub form_type: EvidenceKind,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl From<MagicLink> for MagicLinkBody {
    fn from(l: MagicLink) -> Self {
        Self {
            id: l.id.0,
            evidence_id: l.evidence_id.0,
            recipient_email: l.recipient_email,
            recipient_gmc: l.recipient_credential_id,
            form_type: l.kind,
            created_at: l.created_at,
            expires_at: l.expires_at,
            used_at: l.used_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EditRequestBody {
    pub id: Uuid,
    pub evidence_id: Uuid,
    pub requested_by: Uuid,
    pub fields: Vec<String>,
    pub reason: Option<String>,
    pub status: &'static str,
    pub decided_by: Option<Uuid>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<EditRequest> for EditRequestBody {
    fn from(r: EditRequest) -> Self {
        Self {
            id: r.id.0,
            evidence_id: r.evidence_id.0,
            requested_by: r.requested_by.0,
            fields: r.fields,
            reason: r.reason,
            status: r.status.as_str(),
            decided_by: r.decided_by.map(|u| u.0),
            decided_at: r.decided_at,
            created_at: r.created_at,
        }
    }
}
