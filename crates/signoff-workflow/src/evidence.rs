//! Authenticated in-app operations: the owner's drafting and the supervisor of record acting
//! from their own account. Every write goes through [`machine::plan`] like the link path does.

use serde_json::{json, Value};
use signoff_audit::{AuditAction, AuditEvent, AuditLog, AuditResult};
use signoff_storage::{
    CreateEditRequestParams, CreateEvidenceParams, DecideEditRequestParams, EditRequest,
    EditRequestId, EditRequestStatus, Evidence, EvidenceId, EvidenceKind, EvidenceStatus,
    MagicLink, Store, StoreError, User,
};
use tracing::{debug, info};

use crate::machine::{self, Action, Actor, Changes, Role};
use crate::validator::check_link;
use crate::{ScopedView, Workflow, WorkflowError, MAX_WRITE_ATTEMPTS};

fn audit_action(action: Action) -> AuditAction {
    match action {
        Action::Save => AuditAction::EvidenceSave,
        Action::Submit => AuditAction::EvidenceSubmit,
        Action::SignOff => AuditAction::EvidenceSignOff,
        Action::Decline => AuditAction::EvidenceDecline,
        Action::Withdraw => AuditAction::EvidenceWithdraw,
        Action::ApproveAmendment => AuditAction::EditRequestApprove,
    }
}

fn normalize_fields(fields: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(fields.len());
    for f in fields {
        let f = f.trim();
        if !f.is_empty() && !out.iter().any(|o| o == f) {
            out.push(f.to_string());
        }
    }
    out
}

impl<S: Store + AuditLog> Workflow<S> {
    /// Start a new draft owned by `owner`.
    pub async fn create_evidence(
        &self,
        owner: &User,
        kind: EvidenceKind,
        payload: Value,
    ) -> Result<Evidence, WorkflowError> {
        let payload = match payload {
            Value::Null => json!({}),
            Value::Object(_) => payload,
            _ => {
                return Err(WorkflowError::InvalidRequest(
                    "payload must be a JSON object".into(),
                ))
            }
        };
        let now = self.now();
        let evidence = self
            .store()
            .create_evidence(&CreateEvidenceParams {
                owner_id: owner.id,
                kind,
                payload,
                created_at: now,
            })
            .await?;

        self.audit(
            AuditEvent::builder(AuditAction::EvidenceCreate)
                .at(now)
                .actor(Some(&owner.id))
                .actor_email(owner.email.clone())
                .evidence(&evidence.id)
                .details(json!({ "kind": kind.as_str() }))
                .build(),
        )
        .await;
        info!(evidence_id = %evidence.id, %kind, "evidence created");
        Ok(evidence)
    }

    async fn load_as(
        &self,
        user: &User,
        id: &EvidenceId,
    ) -> Result<(Evidence, Role), WorkflowError> {
        let record = self.store().get_evidence(id).await?;
        let role = machine::role_of(&record, Actor::Account(user), self.now());
        Ok((record, role))
    }

    /// Read a record with its linked context. Owner or supervisor of record only.
    pub async fn get_evidence_for(
        &self,
        user: &User,
        id: &EvidenceId,
    ) -> Result<ScopedView, WorkflowError> {
        let (evidence, role) = self.load_as(user, id).await?;
        if role == Role::Stranger {
            return Err(WorkflowError::Unauthorized);
        }
        let linked = self.store().list_linked_evidence(&evidence.id).await?;
        Ok(ScopedView { evidence, linked })
    }

    /// Plan and apply `action` as `user`, re-reading and retrying on version conflicts.
    async fn write_as(
        &self,
        user: &User,
        id: &EvidenceId,
        action: Action,
        changes: &Changes,
    ) -> Result<Evidence, WorkflowError> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let (record, role) = self.load_as(user, id).await?;
            let now = self.now();
            let update = machine::plan(&record, role, action, changes, now)?;
            match self.store().update_evidence(&update).await {
                Ok(evidence) => return Ok(evidence),
                Err(StoreError::Conflict) => {
                    debug!(evidence_id = %id, %action, attempt, "write lost a race, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(WorkflowError::TransientStorage(
            "record kept changing during the update".into(),
        ))
    }

    async fn audit_write(&self, user: &User, action: Action, evidence: &Evidence, details: Value) {
        self.audit(
            AuditEvent::builder(audit_action(action))
                .at(evidence.updated_at)
                .actor(Some(&user.id))
                .actor_email(user.email.clone())
                .evidence(&evidence.id)
                .details(details)
                .build(),
        )
        .await;
    }

    /// Merge `patch` into the payload. Owner on a draft, supervisor on a submitted record.
    pub async fn save_evidence(
        &self,
        user: &User,
        id: &EvidenceId,
        patch: Value,
    ) -> Result<Evidence, WorkflowError> {
        let evidence = self
            .write_as(user, id, Action::Save, &Changes::patch(patch))
            .await?;
        self.audit_write(
            user,
            Action::Save,
            &evidence,
            json!({ "via": "account", "version": evidence.version }),
        )
        .await;
        Ok(evidence)
    }

    /// Sign off from the supervisor's own account. The account name becomes the signing name.
    pub async fn sign_off_evidence(
        &self,
        user: &User,
        id: &EvidenceId,
        patch: Value,
    ) -> Result<Evidence, WorkflowError> {
        let changes = Changes {
            patch: Some(patch),
            supervisor_name: Some(user.name.clone()),
            ..Changes::default()
        };
        let evidence = self.write_as(user, id, Action::SignOff, &changes).await?;
        self.audit_write(
            user,
            Action::SignOff,
            &evidence,
            json!({ "via": "account", "version": evidence.version }),
        )
        .await;
        info!(evidence_id = %evidence.id, "evidence signed off in-app");
        Ok(evidence)
    }

    /// Send a submitted record back to its owner. Outstanding links stop authorizing writes.
    pub async fn decline_evidence(
        &self,
        user: &User,
        id: &EvidenceId,
        reason: Option<String>,
    ) -> Result<Evidence, WorkflowError> {
        let evidence = self
            .write_as(user, id, Action::Decline, &Changes::default())
            .await?;
        self.audit_write(
            user,
            Action::Decline,
            &evidence,
            json!({ "reason": reason, "version": evidence.version }),
        )
        .await;
        info!(evidence_id = %evidence.id, "evidence declined");
        Ok(evidence)
    }

    /// Owner takes a submitted record back to draft once no link for it can still be used.
    ///
    /// Recovers a submission sent to the wrong or an unavailable supervisor. The pending
    /// supervisor is cleared, so the next issue starts a fresh submission.
    pub async fn withdraw_evidence(
        &self,
        user: &User,
        id: &EvidenceId,
    ) -> Result<Evidence, WorkflowError> {
        let (record, role) = self.load_as(user, id).await?;
        if role != Role::Owner {
            return Err(WorkflowError::Unauthorized);
        }
        if record.status != EvidenceStatus::Submitted {
            return Err(WorkflowError::IllegalTransition {
                from: record.status,
                action: Action::Withdraw,
            });
        }
        let now = self.now();
        let live = self
            .store()
            .list_magic_links_for_evidence(&record.id)
            .await?
            .into_iter()
            .filter(|link| check_link(link, &record, now).is_ok())
            .count();
        if live > 0 {
            return Err(WorkflowError::InvalidRequest(format!(
                "{} sign-off link(s) can still be used; withdraw once they expire",
                live
            )));
        }

        let evidence = self
            .write_as(user, id, Action::Withdraw, &Changes::default())
            .await?;
        self.audit_write(
            user,
            Action::Withdraw,
            &evidence,
            json!({ "version": evidence.version }),
        )
        .await;
        info!(evidence_id = %evidence.id, "submission withdrawn");
        Ok(evidence)
    }

    /// Declare `linked_id` as read-only context shown to whoever reviews `id`.
    pub async fn link_evidence(
        &self,
        user: &User,
        id: &EvidenceId,
        linked_id: &EvidenceId,
    ) -> Result<(), WorkflowError> {
        if id == linked_id {
            return Err(WorkflowError::InvalidRequest(
                "a record cannot be linked to itself".into(),
            ));
        }
        let target = self.store().get_evidence(id).await?;
        let linked = self.store().get_evidence(linked_id).await?;
        if target.owner_id != user.id || linked.owner_id != user.id {
            return Err(WorkflowError::Unauthorized);
        }
        if target.status == EvidenceStatus::SignedOff {
            return Err(WorkflowError::AlreadySignedOff);
        }
        self.store().add_evidence_link(id, linked_id).await?;
        debug!(evidence_id = %id, linked_id = %linked_id, "context record linked");
        Ok(())
    }

    /// Every link ever issued for a record, newest first. Owner only.
    pub async fn list_links(
        &self,
        user: &User,
        id: &EvidenceId,
    ) -> Result<Vec<MagicLink>, WorkflowError> {
        let (record, role) = self.load_as(user, id).await?;
        if role != Role::Owner {
            return Err(WorkflowError::Unauthorized);
        }
        Ok(self.store().list_magic_links_for_evidence(&record.id).await?)
    }

    // ───────────────────────────── Amendments ─────────────────────────────

    /// Owner asks the supervisor of record to reopen `fields` of a signed-off record.
    pub async fn request_edit(
        &self,
        user: &User,
        id: &EvidenceId,
        fields: Vec<String>,
        reason: Option<String>,
    ) -> Result<EditRequest, WorkflowError> {
        let (record, role) = self.load_as(user, id).await?;
        if role != Role::Owner {
            return Err(WorkflowError::Unauthorized);
        }
        if record.status != EvidenceStatus::SignedOff {
            return Err(WorkflowError::InvalidRequest(
                "only signed-off records can be amended".into(),
            ));
        }
        let fields = normalize_fields(fields);
        if fields.is_empty() {
            return Err(WorkflowError::InvalidRequest(
                "an edit request must name at least one field".into(),
            ));
        }

        let now = self.now();
        let request = self
            .store()
            .create_edit_request(&CreateEditRequestParams {
                evidence_id: record.id,
                requested_by: user.id,
                fields,
                reason,
                created_at: now,
            })
            .await?;

        self.audit(
            AuditEvent::builder(AuditAction::EditRequestCreate)
                .at(now)
                .actor(Some(&user.id))
                .actor_email(user.email.clone())
                .evidence(&record.id)
                .details(json!({
                    "edit_request_id": request.id.to_string(),
                    "fields": request.fields,
                }))
                .build(),
        )
        .await;
        Ok(request)
    }

    /// Edit requests for a record, newest first. Owner or supervisor of record.
    pub async fn list_edit_requests(
        &self,
        user: &User,
        id: &EvidenceId,
    ) -> Result<Vec<EditRequest>, WorkflowError> {
        let (record, role) = self.load_as(user, id).await?;
        if role == Role::Stranger {
            return Err(WorkflowError::Unauthorized);
        }
        Ok(self.store().list_edit_requests(&record.id).await?)
    }

    /// Supervisor of record approves: the record returns to draft with the requested fields
    /// unlocked. The first sign-off timestamp is kept.
    pub async fn approve_edit_request(
        &self,
        user: &User,
        request_id: &EditRequestId,
    ) -> Result<(EditRequest, Evidence), WorkflowError> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let request = self.pending_request(request_id).await?;
            let (record, role) = self.load_as(user, &request.evidence_id).await?;
            let now = self.now();
            let changes = Changes {
                unlocked_fields: request.fields.clone(),
                ..Changes::default()
            };
            let update = machine::plan(&record, role, Action::ApproveAmendment, &changes, now)?;
            let decision = DecideEditRequestParams {
                id: request.id,
                decided_by: user.id,
                decided_at: now,
            };

            match self.store().approve_edit_request(&decision, &update).await {
                Ok((request, evidence)) => {
                    self.audit(
                        AuditEvent::builder(AuditAction::EditRequestApprove)
                            .at(now)
                            .actor(Some(&user.id))
                            .actor_email(user.email.clone())
                            .evidence(&evidence.id)
                            .details(json!({
                                "edit_request_id": request.id.to_string(),
                                "unlocked_fields": evidence.unlocked_fields,
                            }))
                            .build(),
                    )
                    .await;
                    info!(evidence_id = %evidence.id, edit_request_id = %request.id, "amendment approved");
                    return Ok((request, evidence));
                }
                Err(StoreError::Conflict) => {
                    debug!(edit_request_id = %request_id, attempt, "approval lost a race, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(WorkflowError::TransientStorage(
            "record kept changing during approval".into(),
        ))
    }

    /// Supervisor of record denies: the record stays signed off.
    pub async fn deny_edit_request(
        &self,
        user: &User,
        request_id: &EditRequestId,
    ) -> Result<EditRequest, WorkflowError> {
        let request = self.pending_request(request_id).await?;
        let (record, role) = self.load_as(user, &request.evidence_id).await?;
        if role != Role::Supervisor {
            return Err(WorkflowError::Unauthorized);
        }

        let now = self.now();
        let decision = DecideEditRequestParams {
            id: request.id,
            decided_by: user.id,
            decided_at: now,
        };
        let request = match self.store().deny_edit_request(&decision).await {
            Ok(request) => request,
            Err(StoreError::Conflict) => return Err(already_decided()),
            Err(e) => return Err(e.into()),
        };

        self.audit(
            AuditEvent::builder(AuditAction::EditRequestDeny)
                .at(now)
                .actor(Some(&user.id))
                .actor_email(user.email.clone())
                .evidence(&record.id)
                .result(AuditResult::Refused)
                .details(json!({ "edit_request_id": request.id.to_string() }))
                .build(),
        )
        .await;
        Ok(request)
    }

    async fn pending_request(&self, id: &EditRequestId) -> Result<EditRequest, WorkflowError> {
        let request = match self.store().get_edit_request(id).await {
            Ok(request) => request,
            Err(StoreError::NotFound) => {
                return Err(WorkflowError::InvalidRequest("edit request not found".into()))
            }
            Err(e) => return Err(e.into()),
        };
        if request.status != EditRequestStatus::Pending {
            return Err(already_decided());
        }
        Ok(request)
    }
}

fn already_decided() -> WorkflowError {
    WorkflowError::InvalidRequest("edit request has already been decided".into())
}
