//! Edit request (amendment of a signed-off record) types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::{EditRequestId, EvidenceId, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EditRequestStatus {
    Pending,
    Approved,
    Denied,
}

impl FromStr for EditRequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EditRequestStatus::Pending),
            "approved" => Ok(EditRequestStatus::Approved),
            "denied" => Ok(EditRequestStatus::Denied),
            _ => Err(format!("invalid edit request status: {}", s)),
        }
    }
}

impl EditRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditRequestStatus::Pending => "pending",
            EditRequestStatus::Approved => "approved",
            EditRequestStatus::Denied => "denied",
        }
    }
}

impl fmt::Display for EditRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edit request record
#[derive(Clone, Debug, PartialEq)]
pub struct EditRequest {
    pub id: EditRequestId,
    pub evidence_id: EvidenceId,
    pub requested_by: UserId,
    pub fields: Vec<String>, // Fields the owner asks to reopen
    pub reason: Option<String>,
    pub status: EditRequestStatus,
    pub decided_by: Option<UserId>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating an edit request
#[derive(Clone, Debug)]
pub struct CreateEditRequestParams {
    pub evidence_id: EvidenceId,
    pub requested_by: UserId,
    pub fields: Vec<String>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Decision on a pending edit request
#[derive(Clone, Debug)]
pub struct DecideEditRequestParams {
    pub id: EditRequestId,
    pub decided_by: UserId,
    pub decided_at: DateTime<Utc>,
}
