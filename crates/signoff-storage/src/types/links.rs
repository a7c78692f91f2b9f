//! Magic link types.

use chrono::{DateTime, Utc};

use super::{EvidenceId, EvidenceKind, MagicLinkId, UserId};

/// Magic link record. Only the SHA-256 hash of the bearer token is stored.
#[derive(Clone, Debug, PartialEq)]
pub struct MagicLink {
    pub id: MagicLinkId,
    pub token_hash: String,
    pub evidence_id: EvidenceId,
    pub recipient_email: String,
    pub recipient_credential_id: Option<String>,
    pub kind: EvidenceKind,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>, // Set once by a terminal submission
}

/// Parameters for creating a magic link
#[derive(Clone, Debug)]
pub struct CreateMagicLinkParams {
    pub token_hash: String, // Hash of the bearer token (for lookup)
    pub evidence_id: EvidenceId,
    pub recipient_email: String,
    pub recipient_credential_id: Option<String>,
    pub kind: EvidenceKind,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
