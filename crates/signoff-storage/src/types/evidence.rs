//! Evidence record types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EvidenceId, UserId};

/// Assessment kind discriminator, fixed at creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvidenceKind {
    Epa,
    Cbd,
    Dops,
    Osats,
    Crs,
    Mar,
    Gsat,
    Msf,
    Arcp,
}

/// Error type for parsing EvidenceKind from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEvidenceKindError(pub String);

impl fmt::Display for ParseEvidenceKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid evidence kind: {}", self.0)
    }
}

impl std::error::Error for ParseEvidenceKindError {}

impl FromStr for EvidenceKind {
    type Err = ParseEvidenceKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EPA" => Ok(EvidenceKind::Epa),
            "CBD" => Ok(EvidenceKind::Cbd),
            "DOPS" => Ok(EvidenceKind::Dops),
            "OSATS" => Ok(EvidenceKind::Osats),
            "CRS" => Ok(EvidenceKind::Crs),
            "MAR" => Ok(EvidenceKind::Mar),
            "GSAT" => Ok(EvidenceKind::Gsat),
            "MSF" => Ok(EvidenceKind::Msf),
            "ARCP" => Ok(EvidenceKind::Arcp),
            _ => Err(ParseEvidenceKindError(s.to_string())),
        }
    }
}

impl EvidenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceKind::Epa => "EPA",
            EvidenceKind::Cbd => "CBD",
            EvidenceKind::Dops => "DOPS",
            EvidenceKind::Osats => "OSATS",
            EvidenceKind::Crs => "CRS",
            EvidenceKind::Mar => "MAR",
            EvidenceKind::Gsat => "GSAT",
            EvidenceKind::Msf => "MSF",
            EvidenceKind::Arcp => "ARCP",
        }
    }

    /// Human-readable label used in emails.
    pub fn label(&self) -> &'static str {
        match self {
            EvidenceKind::Epa => "Entrustable Professional Activity",
            EvidenceKind::Cbd => "Case-Based Discussion",
            EvidenceKind::Dops => "Direct Observation of Procedural Skills",
            EvidenceKind::Osats => "Objective Structured Assessment of Technical Skills",
            EvidenceKind::Crs => "Clinical Rating Scale",
            EvidenceKind::Mar => "Mini-Assessed Report",
            EvidenceKind::Gsat => "Generic Skills Assessment Tool",
            EvidenceKind::Msf => "Multi-Source Feedback",
            EvidenceKind::Arcp => "Annual Review of Competence Progression",
        }
    }
}

impl fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sign-off status. `SignedOff` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStatus {
    Draft,
    Submitted,
    SignedOff,
}

/// Error type for parsing EvidenceStatus from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEvidenceStatusError(pub String);

impl fmt::Display for ParseEvidenceStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid evidence status: {}", self.0)
    }
}

impl std::error::Error for ParseEvidenceStatusError {}

impl FromStr for EvidenceStatus {
    type Err = ParseEvidenceStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(EvidenceStatus::Draft),
            "submitted" => Ok(EvidenceStatus::Submitted),
            "signed_off" => Ok(EvidenceStatus::SignedOff),
            _ => Err(ParseEvidenceStatusError(s.to_string())),
        }
    }
}

impl EvidenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceStatus::Draft => "draft",
            EvidenceStatus::Submitted => "submitted",
            EvidenceStatus::SignedOff => "signed_off",
        }
    }
}

impl fmt::Display for EvidenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supervisor captured at submission, finalized at sign-off.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorIdentity {
    pub name: Option<String>,
    pub email: String,
    pub credential_id: Option<String>, // e.g. GMC number
}

/// Evidence record
#[derive(Clone, Debug, PartialEq)]
pub struct Evidence {
    pub id: EvidenceId,
    pub owner_id: UserId,
    pub kind: EvidenceKind,
    pub status: EvidenceStatus,
    pub payload: serde_json::Value,
    pub supervisor: Option<SupervisorIdentity>,
    pub signed_off_at: Option<DateTime<Utc>>, // First sign-off, never overwritten
    pub unlocked_fields: Vec<String>,         // Fields opened by an approved edit request
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Evidence {
    /// Draft that was signed off before and reopened through an edit request.
    pub fn is_amending(&self) -> bool {
        self.signed_off_at.is_some() && self.status != EvidenceStatus::SignedOff
    }
}

/// Parameters for creating an evidence record
#[derive(Clone, Debug)]
pub struct CreateEvidenceParams {
    pub owner_id: UserId,
    pub kind: EvidenceKind,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Full replacement of the mutable columns of an evidence row, applied only if the
/// stored row still has `expected_version` and `expected_status`.
#[derive(Clone, Debug, PartialEq)]
pub struct EvidenceUpdate {
    pub id: EvidenceId,
    pub expected_version: i64,
    pub expected_status: EvidenceStatus,
    pub status: EvidenceStatus,
    pub payload: serde_json::Value,
    pub supervisor: Option<SupervisorIdentity>,
    pub signed_off_at: Option<DateTime<Utc>>,
    pub unlocked_fields: Vec<String>,
    pub updated_at: DateTime<Utc>,
}
