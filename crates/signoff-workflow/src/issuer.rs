use serde_json::json;
use signoff_audit::{AuditAction, AuditEvent, AuditLog};
use signoff_storage::{
    CreateMagicLinkParams, Evidence, EvidenceId, EvidenceKind, EvidenceStatus, MagicLink, Store,
    StoreError, SupervisorIdentity, UserId,
};
use tracing::{debug, info};

use crate::machine::{self, Action, Changes, Role};
use crate::token::{generate_token, hash_token};
use crate::{Workflow, WorkflowError, MAX_WRITE_ATTEMPTS};

#[derive(Clone, Debug)]
pub struct IssueRequest {
    pub evidence_id: EvidenceId,
    pub recipient_email: String,
    pub recipient_credential_id: Option<String>,
    pub kind: EvidenceKind,
    pub issuer_id: UserId,
}

/// The only place the raw token exists outside the recipient's inbox.
#[derive(Clone, Debug)]
pub struct IssuedLink {
    pub token: String,
    pub url: String,
    pub link: MagicLink,
    pub evidence: Evidence,
}

fn valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

impl<S: Store + AuditLog> Workflow<S> {
    /// Issue a magic link for `evidence_id` to a supervisor.
    ///
    /// On a draft this is the owner's submit: the record moves to `Submitted` with the
    /// recipient as pending supervisor, in the same transaction as the link insert. On a
    /// submitted record the link is re-issued to the pending supervisor only.
    pub async fn issue_link(&self, req: IssueRequest) -> Result<IssuedLink, WorkflowError> {
        let recipient = req.recipient_email.trim().to_string();
        if !valid_email(&recipient) {
            return Err(WorkflowError::InvalidRequest(
                "recipient_email is not a valid email address".into(),
            ));
        }
        let issuer = match self.store().get_user_by_id(&req.issuer_id).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Err(WorkflowError::Unauthorized),
            Err(e) => return Err(e.into()),
        };
        let self_addressed = issuer.email.trim().eq_ignore_ascii_case(&recipient);
        let credential = req
            .recipient_credential_id
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let record = self.store().get_evidence(&req.evidence_id).await?;
            if record.owner_id != req.issuer_id {
                return Err(WorkflowError::Unauthorized);
            }
            if self_addressed {
                return Err(WorkflowError::InvalidRequest(
                    "a sign-off link cannot be sent to your own email address".into(),
                ));
            }
            if record.kind != req.kind {
                return Err(WorkflowError::InvalidKind);
            }

            let token = generate_token();
            let now = self.now();
            let params = CreateMagicLinkParams {
                token_hash: hash_token(&token),
                evidence_id: record.id,
                recipient_email: recipient.clone(),
                recipient_credential_id: credential.clone(),
                kind: record.kind,
                created_by: req.issuer_id,
                created_at: now,
                expires_at: now + self.settings().link_ttl,
            };

            let written = match record.status {
                EvidenceStatus::Draft => {
                    let changes = Changes {
                        supervisor: Some(SupervisorIdentity {
                            name: None,
                            email: recipient.clone(),
                            credential_id: credential.clone(),
                        }),
                        ..Changes::default()
                    };
                    let update = machine::plan(&record, Role::Owner, Action::Submit, &changes, now)?;
                    self.store().submit_with_link(&update, &params).await
                }
                EvidenceStatus::Submitted => {
                    let pending = record
                        .supervisor
                        .as_ref()
                        .map(|s| s.email.eq_ignore_ascii_case(&recipient))
                        .unwrap_or(false);
                    if !pending {
                        return Err(WorkflowError::IllegalTransition {
                            from: record.status,
                            action: Action::Submit,
                        });
                    }
                    self.store()
                        .create_magic_link(&params)
                        .await
                        .map(|link| (record.clone(), link))
                }
                EvidenceStatus::SignedOff => {
                    return Err(WorkflowError::IllegalTransition {
                        from: record.status,
                        action: Action::Submit,
                    });
                }
            };

            let (evidence, link) = match written {
                Ok(written) => written,
                Err(StoreError::Conflict) => {
                    debug!(evidence_id = %record.id, attempt, "issue lost a race, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let submitted = record.status == EvidenceStatus::Draft;
            if submitted {
                self.audit(
                    AuditEvent::builder(AuditAction::EvidenceSubmit)
                        .at(now)
                        .actor(Some(&req.issuer_id))
                        .evidence(&evidence.id)
                        .details(json!({ "supervisor_email": recipient }))
                        .build(),
                )
                .await;
            }
            self.audit(
                AuditEvent::builder(AuditAction::LinkCreate)
                    .at(now)
                    .actor(Some(&req.issuer_id))
                    .evidence(&evidence.id)
                    .details(json!({
                        "link_id": link.id.to_string(),
                        "recipient_email": recipient,
                        "expires_at": link.expires_at,
                    }))
                    .build(),
            )
            .await;

            info!(
                evidence_id = %evidence.id,
                link_id = %link.id,
                kind = %evidence.kind,
                submitted,
                expires_at = %link.expires_at,
                "magic link issued"
            );

            let url = format!(
                "{}/magic-link?token={}",
                self.settings().public_url.trim_end_matches('/'),
                token
            );
            return Ok(IssuedLink {
                token,
                url,
                link,
                evidence,
            });
        }

        Err(WorkflowError::TransientStorage(
            "record kept changing while issuing the link".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape_check() {
        assert!(valid_email("sup@example.org"));
        assert!(valid_email("first.last+tag@nhs.net"));
        assert!(!valid_email("sup"));
        assert!(!valid_email("@example.org"));
        assert!(!valid_email("sup@localhost"));
        assert!(!valid_email("sup@@example.org"));
        assert!(!valid_email("sup @example.org"));
        assert!(!valid_email("sup@example."));
    }
}
