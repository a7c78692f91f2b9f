use serde_json::{json, Value};
use signoff_audit::{AuditAction, AuditEvent, AuditLog, AuditResult};
use signoff_storage::{Evidence, EvidenceId, EvidenceKind, EvidenceStatus, Store, StoreError};
use tracing::{debug, info, warn};

use crate::machine::{self, Action, Actor, Changes};
use crate::token::hash_token;
use crate::{TokenRefusal, Workflow, WorkflowError, MAX_WRITE_ATTEMPTS};

/// A write presented with a magic link.
#[derive(Clone, Debug)]
pub struct SubmitRequest {
    pub token: String,
    pub evidence_id: EvidenceId,
    /// Merge patch applied to the payload.
    pub patch: Value,
    /// Completes the sign-off and burns the link.
    pub terminal: bool,
    /// Sends the record back to its owner instead. The link is not consumed.
    pub decline: bool,
    /// Why the supervisor declined, kept in the audit trail.
    pub reason: Option<String>,
    /// Kind the recipient's form was rendered for, if the client sent one.
    pub form_type: Option<EvidenceKind>,
    /// Name the supervisor signs with. Only read on terminal submissions.
    pub supervisor_name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct SubmitOutcome {
    pub evidence: Evidence,
    /// Whether this call consumed the link.
    pub consumed: bool,
}

impl<S: Store + AuditLog> Workflow<S> {
    /// The single write path for token holders.
    ///
    /// The link is re-validated on every call. A non-terminal submit merges the patch under
    /// compare-and-set and leaves the link usable. A terminal submit signs the record off and
    /// marks the link used in one transaction; of any number of concurrent terminal submits
    /// exactly one succeeds. A decline returns the record to draft without touching the link;
    /// the link stops authorizing writes because its target is no longer submitted.
    pub async fn submit_with_token(
        &self,
        req: SubmitRequest,
    ) -> Result<SubmitOutcome, WorkflowError> {
        let action = match (req.terminal, req.decline) {
            (true, true) => {
                let err = WorkflowError::InvalidRequest(
                    "a submission cannot both complete and decline".into(),
                );
                return Err(self.refuse(&req, err).await);
            }
            (true, false) => Action::SignOff,
            (false, true) => Action::Decline,
            (false, false) => Action::Save,
        };
        let changes = Changes {
            patch: Some(req.patch.clone()),
            supervisor_name: req
                .supervisor_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            ..Changes::default()
        };

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let (link, record) = match self.resolve_link(&req.token).await {
                Ok(found) => found,
                Err(WorkflowError::TokenInvalid { reason }) => {
                    return Err(self.refuse(&req, WorkflowError::token(reason)).await);
                }
                Err(e) => return Err(e),
            };

            if record.id != req.evidence_id {
                return Err(self.refuse(&req, WorkflowError::RecordMismatch).await);
            }
            if req.form_type.is_some_and(|kind| kind != record.kind) {
                return Err(self.refuse(&req, WorkflowError::InvalidKind).await);
            }

            let now = self.now();
            let role = machine::role_of(&record, Actor::Link(&link), now);
            let update = match machine::plan(&record, role, action, &changes, now) {
                Ok(update) => update,
                Err(e) => return Err(self.refuse(&req, e).await),
            };

            let written = if req.terminal {
                self.store().sign_off_with_link(&update, &link.id, now).await
            } else {
                self.store().update_evidence(&update).await
            };

            let evidence = match written {
                Ok(evidence) => evidence,
                Err(StoreError::Conflict) => {
                    debug!(evidence_id = %record.id, attempt, terminal = req.terminal, "submit lost a race");
                    if req.terminal {
                        if let Some(refusal) = self.explain_lost_sign_off(&req).await? {
                            return Err(self.refuse(&req, refusal).await);
                        }
                    }
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if req.terminal {
                self.audit(
                    AuditEvent::builder(AuditAction::LinkConsume)
                        .at(now)
                        .actor_email(link.recipient_email.clone())
                        .evidence(&evidence.id)
                        .details(json!({ "link_id": link.id.to_string() }))
                        .build(),
                )
                .await;
                self.audit(
                    AuditEvent::builder(AuditAction::EvidenceSignOff)
                        .at(now)
                        .actor_email(link.recipient_email.clone())
                        .evidence(&evidence.id)
                        .details(json!({
                            "via": "magic_link",
                            "version": evidence.version,
                        }))
                        .build(),
                )
                .await;
                info!(evidence_id = %evidence.id, link_id = %link.id, "evidence signed off via magic link");
            } else if req.decline {
                self.audit(
                    AuditEvent::builder(AuditAction::EvidenceDecline)
                        .at(now)
                        .actor_email(link.recipient_email.clone())
                        .evidence(&evidence.id)
                        .details(json!({
                            "via": "magic_link",
                            "link_id": link.id.to_string(),
                            "reason": req.reason,
                            "version": evidence.version,
                        }))
                        .build(),
                )
                .await;
                info!(evidence_id = %evidence.id, link_id = %link.id, "evidence declined via magic link");
            } else {
                self.audit(
                    AuditEvent::builder(AuditAction::EvidenceSave)
                        .at(now)
                        .actor_email(link.recipient_email.clone())
                        .evidence(&evidence.id)
                        .details(json!({
                            "via": "magic_link",
                            "version": evidence.version,
                        }))
                        .build(),
                )
                .await;
                debug!(evidence_id = %evidence.id, version = evidence.version, "supervisor progress saved");
            }

            return Ok(SubmitOutcome {
                evidence,
                consumed: req.terminal,
            });
        }

        warn!(evidence_id = %req.evidence_id, "submit gave up after repeated write conflicts");
        Err(WorkflowError::TransientStorage(
            "record kept changing during submission".into(),
        ))
    }

    /// After a terminal write lost its race, decide whether the loss is final.
    ///
    /// `None` means only the version moved (a concurrent save) and the caller may retry.
    async fn explain_lost_sign_off(
        &self,
        req: &SubmitRequest,
    ) -> Result<Option<WorkflowError>, WorkflowError> {
        let link = match self
            .store()
            .get_magic_link_by_token_hash(&hash_token(&req.token))
            .await
        {
            Ok(link) => link,
            Err(StoreError::NotFound) => return Ok(Some(WorkflowError::token(TokenRefusal::NotFound))),
            Err(e) => return Err(e.into()),
        };
        let record = self.store().get_evidence(&link.evidence_id).await?;

        if record.status == EvidenceStatus::SignedOff {
            return Ok(Some(WorkflowError::AlreadySignedOff));
        }
        if link.used_at.is_some() {
            return Ok(Some(WorkflowError::token(TokenRefusal::Used)));
        }
        if self.now() >= link.expires_at {
            return Ok(Some(WorkflowError::token(TokenRefusal::Expired)));
        }
        Ok(None)
    }

    /// Audit a refused link submission and hand the error back.
    async fn refuse(&self, req: &SubmitRequest, err: WorkflowError) -> WorkflowError {
        let reason = match &err {
            WorkflowError::TokenInvalid { reason } => reason.as_str().to_string(),
            other => other.code().to_string(),
        };
        info!(evidence_id = %req.evidence_id, %reason, terminal = req.terminal, "magic link submission refused");
        self.audit(
            AuditEvent::builder(AuditAction::LinkRefuse)
                .at(self.now())
                .evidence(&req.evidence_id)
                .result(AuditResult::Refused)
                .reason(reason)
                .details(json!({ "terminal": req.terminal, "decline": req.decline }))
                .build(),
        )
        .await;
        err
    }
}
