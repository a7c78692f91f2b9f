#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use signoff_storage::{
    CreateUserParams, Evidence, EvidenceId, EvidenceKind, MagicLink, Store, User,
};
use signoff_store_sqlite::SqliteStore;
use signoff_workflow::token::hash_token;
use signoff_workflow::{
    IssueRequest, IssuedLink, ManualClock, SubmitRequest, Workflow, WorkflowSettings,
};

pub const SUPERVISOR_EMAIL: &str = "dr.sup@example.org";
pub const SUPERVISOR_GMC: &str = "7654321";

pub struct Harness {
    pub wf: Workflow<SqliteStore>,
    pub clock: Arc<ManualClock>,
    pub owner: User,
    pub supervisor: User,
}

pub fn start() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_767_600_000_000).unwrap()
}

pub async fn harness() -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let owner = store
        .create_user(&CreateUserParams {
            email: "trainee@example.org".into(),
            name: "Tess Trainee".into(),
            credential_id: None,
        })
        .await
        .unwrap();
    let supervisor = store
        .create_user(&CreateUserParams {
            email: SUPERVISOR_EMAIL.into(),
            name: "Dr Sam Supervisor".into(),
            credential_id: Some(SUPERVISOR_GMC.into()),
        })
        .await
        .unwrap();

    let clock = Arc::new(ManualClock::new(start()));
    let wf = Workflow::new(
        store,
        clock.clone(),
        WorkflowSettings {
            link_ttl: Duration::hours(24),
            public_url: "https://portfolio.example.org/".into(),
        },
    );

    Harness {
        wf,
        clock,
        owner,
        supervisor,
    }
}

impl Harness {
    pub fn clock_now(&self) -> DateTime<Utc> {
        self.wf.now()
    }

    pub fn store(&self) -> &SqliteStore {
        self.wf.store()
    }

    pub async fn draft(&self, kind: EvidenceKind, payload: Value) -> Evidence {
        self.wf
            .create_evidence(&self.owner, kind, payload)
            .await
            .unwrap()
    }

    pub fn issue_request(&self, e: &Evidence) -> IssueRequest {
        IssueRequest {
            evidence_id: e.id,
            recipient_email: SUPERVISOR_EMAIL.into(),
            recipient_credential_id: Some(SUPERVISOR_GMC.into()),
            kind: e.kind,
            issuer_id: self.owner.id,
        }
    }

    pub async fn issue(&self, e: &Evidence) -> IssuedLink {
        self.wf.issue_link(self.issue_request(e)).await.unwrap()
    }

    pub async fn user(&self, email: &str, credential: Option<&str>) -> User {
        self.store()
            .create_user(&CreateUserParams {
                email: email.into(),
                name: email.split('@').next().unwrap_or(email).into(),
                credential_id: credential.map(str::to_string),
            })
            .await
            .unwrap()
    }

    pub async fn reload(&self, id: &EvidenceId) -> Evidence {
        self.store().get_evidence(id).await.unwrap()
    }

    pub async fn link_for(&self, token: &str) -> MagicLink {
        self.store()
            .get_magic_link_by_token_hash(&hash_token(token))
            .await
            .unwrap()
    }
}

pub fn submit(token: &str, id: EvidenceId, patch: Value, terminal: bool) -> SubmitRequest {
    SubmitRequest {
        token: token.to_string(),
        evidence_id: id,
        patch,
        terminal,
        decline: false,
        reason: None,
        form_type: None,
        supervisor_name: if terminal {
            Some("Dr Sam Supervisor".into())
        } else {
            None
        },
    }
}

pub fn decline(token: &str, id: EvidenceId, reason: &str) -> SubmitRequest {
    SubmitRequest {
        decline: true,
        reason: Some(reason.to_string()),
        ..submit(token, id, json!({}), false)
    }
}
