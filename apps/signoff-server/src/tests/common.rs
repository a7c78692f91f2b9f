//! Common test helpers for server tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Response, StatusCode};
use serde_json::{json, Value};
use signoff_storage::{CreateUserParams, Store, User};
use signoff_store_sqlite::SqliteStore;
use signoff_workflow::ManualClock;

use crate::backend::StoreBackend;
use crate::config::ServerConfig;
use crate::email::{EmailError, EmailProvider, MagicLinkEmailContent, Mailer};
use crate::server::{build_router, AppState};

pub const PUBLIC_URL: &str = "https://portfolio.example.org";
pub const SUPERVISOR_EMAIL: &str = "dr.sup@example.org";
pub const SUPERVISOR_GMC: &str = "7654321";

#[derive(Clone, Debug)]
pub struct SentEmail {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub text: String,
}

/// Mail provider that records what it was asked to send, or always fails.
pub struct RecordingProvider {
    pub sent: Arc<Mutex<Vec<SentEmail>>>,
    pub fail: bool,
}

#[async_trait]
impl EmailProvider for RecordingProvider {
    async fn send(
        &self,
        to: &str,
        from: &str,
        content: &MagicLinkEmailContent,
    ) -> Result<(), EmailError> {
        if self.fail {
            return Err(EmailError::SendFailed("connection refused".into()));
        }
        self.sent.lock().unwrap().push(SentEmail {
            to: to.to_string(),
            from: from.to_string(),
            subject: content.subject.clone(),
            text: content.text.clone(),
        });
        Ok(())
    }
}

pub enum Mail {
    None,
    Recording,
    Failing,
}

pub struct TestServer {
    pub base: String,
    pub client: reqwest::Client,
    pub state: AppState,
    pub clock: Arc<ManualClock>,
    pub sent: Arc<Mutex<Vec<SentEmail>>>,
    pub trainee: User,
    pub trainee_session: String,
    pub supervisor: User,
    pub supervisor_session: String,
    pub stranger_session: String,
}

pub fn start() -> DateTime<Utc> {
    DateTime::from_timestamp_millis(1_767_600_000_000).unwrap()
}

async fn create_user(state: &AppState, email: &str, name: &str, gmc: Option<&str>) -> User {
    state
        .workflow
        .store()
        .create_user(&CreateUserParams {
            email: email.to_string(),
            name: name.to_string(),
            credential_id: gmc.map(str::to_string),
        })
        .await
        .unwrap()
}

async fn login(state: &AppState, user: &User) -> String {
    let (token, _) = state
        .workflow
        .create_session(&user.id, Duration::hours(12))
        .await
        .unwrap();
    token
}

/// Test helper: serve the API router on an ephemeral port with in-memory SQLite.
pub async fn spawn_server(mail: Mail) -> TestServer {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let clock = Arc::new(ManualClock::new(start()));
    let sent = Arc::new(Mutex::new(Vec::new()));

    let mailer = match mail {
        Mail::None => None,
        Mail::Recording | Mail::Failing => Some(Arc::new(Mailer::new(
            Box::new(RecordingProvider {
                sent: sent.clone(),
                fail: matches!(mail, Mail::Failing),
            }),
            "noreply@portfolio.example.org",
            Some("Portfolio Sign-off"),
        ))),
    };

    let config = ServerConfig {
        public_url: PUBLIC_URL.to_string(),
        ..ServerConfig::default()
    };
    let state = AppState::new(StoreBackend::Sqlite(store), config, mailer, clock.clone());

    let trainee = create_user(&state, "trainee@example.org", "Tess Trainee", None).await;
    let supervisor = create_user(
        &state,
        SUPERVISOR_EMAIL,
        "Dr Sam Supervisor",
        Some(SUPERVISOR_GMC),
    )
    .await;
    let stranger = create_user(&state, "other@example.org", "Olly Other", Some("1111111")).await;

    let trainee_session = login(&state, &trainee).await;
    let supervisor_session = login(&state, &supervisor).await;
    let stranger_session = login(&state, &stranger).await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base: format!("http://{}", addr),
        client: reqwest::Client::new(),
        state,
        clock,
        sent,
        trainee,
        trainee_session,
        supervisor,
        supervisor_session,
        stranger_session,
    }
}

/// Status plus JSON body.
pub async fn read(resp: Response) -> (StatusCode, Value) {
    let status = resp.status();
    let body = resp.json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn post(&self, path: &str, session: Option<&str>, body: Value) -> (StatusCode, Value) {
        let mut req = self.client.post(self.url(path)).json(&body);
        if let Some(token) = session {
            req = req.bearer_auth(token);
        }
        read(req.send().await.unwrap()).await
    }

    pub async fn get(&self, path: &str, session: &str) -> (StatusCode, Value) {
        read(
            self.client
                .get(self.url(path))
                .bearer_auth(session)
                .send()
                .await
                .unwrap(),
        )
        .await
    }

    pub async fn patch(&self, path: &str, session: &str, body: Value) -> (StatusCode, Value) {
        read(
            self.client
                .patch(self.url(path))
                .bearer_auth(session)
                .json(&body)
                .send()
                .await
                .unwrap(),
        )
        .await
    }

    /// Trainee creates a draft; returns its id.
    pub async fn draft(&self, kind: &str, payload: Value) -> String {
        let (status, body) = self
            .post(
                "/evidence",
                Some(&self.trainee_session),
                json!({ "kind": kind, "payload": payload }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    /// Trainee issues a link for `evidence_id` to the supervisor; returns the create response.
    pub async fn issue(&self, evidence_id: &str, kind: &str) -> Value {
        let (status, body) = self
            .post(
                "/create-magic-link",
                Some(&self.trainee_session),
                json!({
                    "evidence_id": evidence_id,
                    "recipient_email": SUPERVISOR_EMAIL,
                    "recipient_gmc": SUPERVISOR_GMC,
                    "form_type": kind,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body
    }

    pub async fn validate(&self, token: &str) -> Value {
        let (status, body) = self
            .post("/validate-magic-link", None, json!({ "token": token }))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body
    }

    pub async fn submit(
        &self,
        token: &str,
        evidence_id: &str,
        updates: Value,
        complete: bool,
    ) -> (StatusCode, Value) {
        self.post(
            "/submit-magic-link-form",
            None,
            json!({
                "token": token,
                "evidenceId": evidence_id,
                "updates": updates,
                "complete": complete,
                "supervisorName": "Dr Sam Supervisor",
            }),
        )
        .await
    }
}
