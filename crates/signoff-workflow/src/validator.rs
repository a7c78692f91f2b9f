use chrono::{DateTime, Utc};
use signoff_audit::AuditLog;
use signoff_storage::{Evidence, EvidenceStatus, MagicLink, Store, StoreError};
use tracing::{debug, info};

use crate::token::hash_token;
use crate::{TokenRefusal, Workflow, WorkflowError};

/// What a valid link lets its holder see: the target and its declared read-only context.
#[derive(Clone, Debug)]
pub struct ScopedView {
    pub evidence: Evidence,
    pub linked: Vec<Evidence>,
}

#[derive(Clone, Debug)]
pub struct ValidationResult {
    pub valid: bool,
    pub reason: Option<TokenRefusal>,
    pub scoped_view: Option<ScopedView>,
    pub expires_at: Option<DateTime<Utc>>,
    pub recipient_email: Option<String>,
}

impl ValidationResult {
    fn refused(reason: TokenRefusal) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            scoped_view: None,
            expires_at: None,
            recipient_email: None,
        }
    }
}

/// The validity invariant, checked in order: used, expired, target signed off.
///
/// A link whose kind or target disagrees with the record, or whose recipient is no longer the
/// record's pending supervisor, is treated as unknown.
pub fn check_link(
    link: &MagicLink,
    target: &Evidence,
    now: DateTime<Utc>,
) -> Result<(), TokenRefusal> {
    if link.used_at.is_some() {
        return Err(TokenRefusal::Used);
    }
    if now >= link.expires_at {
        return Err(TokenRefusal::Expired);
    }
    if target.status == EvidenceStatus::SignedOff {
        return Err(TokenRefusal::TargetSignedOff);
    }
    let addressed = target
        .supervisor
        .as_ref()
        .is_some_and(|s| s.email.eq_ignore_ascii_case(&link.recipient_email));
    if link.evidence_id != target.id || link.kind != target.kind || !addressed {
        return Err(TokenRefusal::NotFound);
    }
    Ok(())
}

impl<S: Store + AuditLog> Workflow<S> {
    /// Look up a presented token and re-check it against the stored record.
    ///
    /// Refusals come back as [`WorkflowError::TokenInvalid`].
    pub(crate) async fn resolve_link(
        &self,
        token: &str,
    ) -> Result<(MagicLink, Evidence), WorkflowError> {
        let link = match self
            .store()
            .get_magic_link_by_token_hash(&hash_token(token))
            .await
        {
            Ok(link) => link,
            Err(StoreError::NotFound) => return Err(WorkflowError::token(TokenRefusal::NotFound)),
            Err(e) => return Err(e.into()),
        };

        let evidence = match self.store().get_evidence(&link.evidence_id).await {
            Ok(evidence) => evidence,
            Err(StoreError::NotFound) => return Err(WorkflowError::token(TokenRefusal::NotFound)),
            Err(e) => return Err(e.into()),
        };

        check_link(&link, &evidence, self.now()).map_err(WorkflowError::token)?;
        Ok((link, evidence))
    }

    /// Read-only: decide whether `token` currently authorizes access and return the scoped view.
    ///
    /// Only storage failures are errors; refusals are reported in the result.
    pub async fn validate_link(&self, token: &str) -> Result<ValidationResult, WorkflowError> {
        let (link, evidence) = match self.resolve_link(token).await {
            Ok(found) => found,
            Err(WorkflowError::TokenInvalid { reason }) => {
                info!(%reason, "magic link refused on validation");
                return Ok(ValidationResult::refused(reason));
            }
            Err(e) => return Err(e),
        };

        let linked = self.store().list_linked_evidence(&evidence.id).await?;
        debug!(evidence_id = %evidence.id, linked = linked.len(), "magic link validated");

        Ok(ValidationResult {
            valid: true,
            reason: None,
            expires_at: Some(link.expires_at),
            recipient_email: Some(link.recipient_email),
            scoped_view: Some(ScopedView { evidence, linked }),
        })
    }
}
