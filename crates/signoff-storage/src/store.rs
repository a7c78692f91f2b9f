//! The Store trait that backends implement.

use chrono::{DateTime, Utc};

use crate::types::*;
use crate::StoreError;

/// The storage trait `signoff-workflow` depends on.
///
/// Conditional writes (`update_evidence`, `sign_off_with_link`, the edit request decisions)
/// return [`StoreError::Conflict`] when their precondition no longer holds and leave the
/// stored rows untouched.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────────── Users ──────────────────────────────────────────

    /// Create a new user.
    async fn create_user(&self, params: &CreateUserParams) -> Result<User, StoreError>;

    /// Get user by ID.
    async fn get_user_by_id(&self, user_id: &UserId) -> Result<User, StoreError>;

    /// Get user by email (case-insensitive).
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError>;

    // ───────────────────────────────────── Sessions ───────────────────────────────────────

    /// Create a login session keyed by the hash of its bearer value.
    async fn create_session(&self, params: &CreateSessionParams) -> Result<Session, StoreError>;

    /// Get a session by token hash. Expiry is checked by the caller.
    async fn get_session(&self, token_hash: &str) -> Result<Session, StoreError>;

    // ───────────────────────────────────── Evidence ───────────────────────────────────────

    /// Create a new evidence record in `Draft` with version 1.
    async fn create_evidence(&self, params: &CreateEvidenceParams)
        -> Result<Evidence, StoreError>;

    /// Get evidence by ID.
    async fn get_evidence(&self, id: &EvidenceId) -> Result<Evidence, StoreError>;

    /// Compare-and-set write of an evidence row. Bumps `version` by one on success.
    async fn update_evidence(&self, update: &EvidenceUpdate) -> Result<Evidence, StoreError>;

    /// Declare `linked_id` as read-only context for `evidence_id`.
    async fn add_evidence_link(
        &self,
        evidence_id: &EvidenceId,
        linked_id: &EvidenceId,
    ) -> Result<(), StoreError>;

    /// Records declared as read-only context for `evidence_id`, oldest first.
    async fn list_linked_evidence(
        &self,
        evidence_id: &EvidenceId,
    ) -> Result<Vec<Evidence>, StoreError>;

    // ───────────────────────────────────── Magic Links ────────────────────────────────────

    /// Persist a new magic link.
    async fn create_magic_link(
        &self,
        params: &CreateMagicLinkParams,
    ) -> Result<MagicLink, StoreError>;

    /// Get magic link by token hash.
    async fn get_magic_link_by_token_hash(&self, token_hash: &str)
        -> Result<MagicLink, StoreError>;

    /// List all links issued for a record, newest first.
    async fn list_magic_links_for_evidence(
        &self,
        evidence_id: &EvidenceId,
    ) -> Result<Vec<MagicLink>, StoreError>;

    /// Apply the owner's submit and insert the link in one transaction.
    async fn submit_with_link(
        &self,
        update: &EvidenceUpdate,
        link: &CreateMagicLinkParams,
    ) -> Result<(Evidence, MagicLink), StoreError>;

    /// Mark the link used and apply the sign-off update in one transaction.
    ///
    /// The link must be unused and unexpired at `used_at`; the evidence row must still match
    /// the update's expected version and status. Otherwise nothing is written and
    /// [`StoreError::Conflict`] is returned.
    async fn sign_off_with_link(
        &self,
        update: &EvidenceUpdate,
        link_id: &MagicLinkId,
        used_at: DateTime<Utc>,
    ) -> Result<Evidence, StoreError>;

    // ───────────────────────────────────── Edit Requests ──────────────────────────────────

    /// File a pending edit request.
    async fn create_edit_request(
        &self,
        params: &CreateEditRequestParams,
    ) -> Result<EditRequest, StoreError>;

    /// Get edit request by ID.
    async fn get_edit_request(&self, id: &EditRequestId) -> Result<EditRequest, StoreError>;

    /// List edit requests for a record, newest first.
    async fn list_edit_requests(
        &self,
        evidence_id: &EvidenceId,
    ) -> Result<Vec<EditRequest>, StoreError>;

    /// Approve a pending request and reopen the record in one transaction.
    async fn approve_edit_request(
        &self,
        decision: &DecideEditRequestParams,
        update: &EvidenceUpdate,
    ) -> Result<(EditRequest, Evidence), StoreError>;

    /// Deny a pending request.
    async fn deny_edit_request(
        &self,
        decision: &DecideEditRequestParams,
    ) -> Result<EditRequest, StoreError>;
}
