use std::fmt;

use serde::Serialize;
use signoff_storage::{EvidenceStatus, StoreError};
use thiserror::Error;

use crate::machine::Action;

/// Why a presented magic link does not currently authorize anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenRefusal {
    NotFound,
    Used,
    Expired,
    TargetSignedOff,
}

impl TokenRefusal {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenRefusal::NotFound => "not_found",
            TokenRefusal::Used => "used",
            TokenRefusal::Expired => "expired",
            TokenRefusal::TargetSignedOff => "target_signed_off",
        }
    }
}

impl fmt::Display for TokenRefusal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("not authorized to act on this record")]
    Unauthorized,

    #[error("evidence record not found")]
    RecordNotFound,

    #[error("form kind does not match the record")]
    InvalidKind,

    #[error("magic link rejected: {reason}")]
    TokenInvalid { reason: TokenRefusal },

    #[error("evidence id does not match the magic link")]
    RecordMismatch,

    #[error("illegal transition: cannot {action} a {from} record")]
    IllegalTransition { from: EvidenceStatus, action: Action },

    #[error("record has already been signed off")]
    AlreadySignedOff,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage temporarily unavailable: {0}")]
    TransientStorage(String),
}

impl WorkflowError {
    pub fn token(reason: TokenRefusal) -> Self {
        WorkflowError::TokenInvalid { reason }
    }

    /// Stable machine-readable code for issuers and support tooling.
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::Unauthorized => "unauthorized",
            WorkflowError::RecordNotFound => "record_not_found",
            WorkflowError::InvalidKind => "invalid_kind",
            WorkflowError::TokenInvalid { .. } => "token_invalid",
            WorkflowError::RecordMismatch => "record_mismatch",
            WorkflowError::IllegalTransition { .. } => "illegal_transition",
            WorkflowError::AlreadySignedOff => "already_signed_off",
            WorkflowError::InvalidRequest(_) => "invalid_request",
            WorkflowError::TransientStorage(_) => "transient_storage",
        }
    }

    /// Only storage hiccups are worth retrying; everything else is a correct refusal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkflowError::TransientStorage(_))
    }

    /// Plain-language text shown to a link recipient.
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::TokenInvalid { reason } => match reason {
                TokenRefusal::NotFound => "This link is not valid. Please ask for a new one.",
                TokenRefusal::Used => "This link has already been used.",
                TokenRefusal::Expired => "This link has expired. Please ask for a new one.",
                TokenRefusal::TargetSignedOff => "This assessment has already been signed off.",
            }
            .to_string(),
            WorkflowError::AlreadySignedOff => {
                "This assessment has already been signed off.".to_string()
            }
            WorkflowError::RecordMismatch => "This link is for a different assessment.".to_string(),
            WorkflowError::InvalidKind => {
                "This link is for a different type of assessment.".to_string()
            }
            WorkflowError::Unauthorized => {
                "You are not allowed to make changes to this assessment.".to_string()
            }
            WorkflowError::RecordNotFound => "This assessment could not be found.".to_string(),
            WorkflowError::IllegalTransition { .. } => {
                "This assessment cannot be changed in its current state.".to_string()
            }
            WorkflowError::InvalidRequest(msg) => format!("The submitted form is invalid: {}.", msg),
            WorkflowError::TransientStorage(_) => {
                "Something went wrong on our side. Please try again in a moment.".to_string()
            }
        }
    }
}

impl From<StoreError> for WorkflowError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => WorkflowError::RecordNotFound,
            StoreError::AlreadyExists => WorkflowError::InvalidRequest("already exists".into()),
            StoreError::Conflict => {
                WorkflowError::TransientStorage("concurrent update, please retry".into())
            }
            StoreError::Backend(msg) => WorkflowError::TransientStorage(msg),
        }
    }
}
