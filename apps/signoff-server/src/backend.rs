use std::sync::Arc;

use chrono::{DateTime, Utc};
use signoff_audit::{AuditEvent, AuditLog, AuditLogError, AuditLogFilter, AuditLogId};
use signoff_storage::*;
use signoff_store_postgres::PostgresStore;
use signoff_store_sqlite::SqliteStore;

/// StoreBackend abstracts over SQLite and PostgreSQL implementations
#[derive(Clone)]
pub enum StoreBackend {
    Sqlite(Arc<SqliteStore>),
    Postgres(Arc<PostgresStore>),
}

impl StoreBackend {
    /// Open the store the URL scheme names. Anything not `postgres:` is treated as SQLite.
    pub async fn open(db_url: &str) -> Result<Self, StoreError> {
        if db_url.starts_with("postgres:") || db_url.starts_with("postgresql:") {
            Ok(StoreBackend::Postgres(Arc::new(
                PostgresStore::open(db_url).await?,
            )))
        } else {
            Ok(StoreBackend::Sqlite(Arc::new(SqliteStore::open(db_url).await?)))
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StoreBackend::Sqlite(_) => "sqlite",
            StoreBackend::Postgres(_) => "postgres",
        }
    }
}

#[async_trait::async_trait]
impl Store for StoreBackend {
    async fn create_user(&self, params: &CreateUserParams) -> Result<User, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.create_user(params).await,
            StoreBackend::Postgres(s) => s.create_user(params).await,
        }
    }

    async fn get_user_by_id(&self, user_id: &UserId) -> Result<User, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.get_user_by_id(user_id).await,
            StoreBackend::Postgres(s) => s.get_user_by_id(user_id).await,
        }
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.get_user_by_email(email).await,
            StoreBackend::Postgres(s) => s.get_user_by_email(email).await,
        }
    }

    async fn create_session(&self, params: &CreateSessionParams) -> Result<Session, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.create_session(params).await,
            StoreBackend::Postgres(s) => s.create_session(params).await,
        }
    }

    async fn get_session(&self, token_hash: &str) -> Result<Session, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.get_session(token_hash).await,
            StoreBackend::Postgres(s) => s.get_session(token_hash).await,
        }
    }

    async fn create_evidence(
        &self,
        params: &CreateEvidenceParams,
    ) -> Result<Evidence, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.create_evidence(params).await,
            StoreBackend::Postgres(s) => s.create_evidence(params).await,
        }
    }

    async fn get_evidence(&self, id: &EvidenceId) -> Result<Evidence, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.get_evidence(id).await,
            StoreBackend::Postgres(s) => s.get_evidence(id).await,
        }
    }

    async fn update_evidence(&self, update: &EvidenceUpdate) -> Result<Evidence, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.update_evidence(update).await,
            StoreBackend::Postgres(s) => s.update_evidence(update).await,
        }
    }

    async fn add_evidence_link(
        &self,
        evidence_id: &EvidenceId,
        linked_id: &EvidenceId,
    ) -> Result<(), StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.add_evidence_link(evidence_id, linked_id).await,
            StoreBackend::Postgres(s) => s.add_evidence_link(evidence_id, linked_id).await,
        }
    }

    async fn list_linked_evidence(
        &self,
        evidence_id: &EvidenceId,
    ) -> Result<Vec<Evidence>, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.list_linked_evidence(evidence_id).await,
            StoreBackend::Postgres(s) => s.list_linked_evidence(evidence_id).await,
        }
    }

    async fn create_magic_link(
        &self,
        params: &CreateMagicLinkParams,
    ) -> Result<MagicLink, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.create_magic_link(params).await,
            StoreBackend::Postgres(s) => s.create_magic_link(params).await,
        }
    }

    async fn get_magic_link_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<MagicLink, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.get_magic_link_by_token_hash(token_hash).await,
            StoreBackend::Postgres(s) => s.get_magic_link_by_token_hash(token_hash).await,
        }
    }

    async fn list_magic_links_for_evidence(
        &self,
        evidence_id: &EvidenceId,
    ) -> Result<Vec<MagicLink>, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.list_magic_links_for_evidence(evidence_id).await,
            StoreBackend::Postgres(s) => s.list_magic_links_for_evidence(evidence_id).await,
        }
    }

    async fn submit_with_link(
        &self,
        update: &EvidenceUpdate,
        link: &CreateMagicLinkParams,
    ) -> Result<(Evidence, MagicLink), StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.submit_with_link(update, link).await,
            StoreBackend::Postgres(s) => s.submit_with_link(update, link).await,
        }
    }

    async fn sign_off_with_link(
        &self,
        update: &EvidenceUpdate,
        link_id: &MagicLinkId,
        used_at: DateTime<Utc>,
    ) -> Result<Evidence, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.sign_off_with_link(update, link_id, used_at).await,
            StoreBackend::Postgres(s) => s.sign_off_with_link(update, link_id, used_at).await,
        }
    }

    async fn create_edit_request(
        &self,
        params: &CreateEditRequestParams,
    ) -> Result<EditRequest, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.create_edit_request(params).await,
            StoreBackend::Postgres(s) => s.create_edit_request(params).await,
        }
    }

    async fn get_edit_request(&self, id: &EditRequestId) -> Result<EditRequest, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.get_edit_request(id).await,
            StoreBackend::Postgres(s) => s.get_edit_request(id).await,
        }
    }

    async fn list_edit_requests(
        &self,
        evidence_id: &EvidenceId,
    ) -> Result<Vec<EditRequest>, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.list_edit_requests(evidence_id).await,
            StoreBackend::Postgres(s) => s.list_edit_requests(evidence_id).await,
        }
    }

    async fn approve_edit_request(
        &self,
        decision: &DecideEditRequestParams,
        update: &EvidenceUpdate,
    ) -> Result<(EditRequest, Evidence), StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.approve_edit_request(decision, update).await,
            StoreBackend::Postgres(s) => s.approve_edit_request(decision, update).await,
        }
    }

    async fn deny_edit_request(
        &self,
        decision: &DecideEditRequestParams,
    ) -> Result<EditRequest, StoreError> {
        match self {
            StoreBackend::Sqlite(s) => s.deny_edit_request(decision).await,
            StoreBackend::Postgres(s) => s.deny_edit_request(decision).await,
        }
    }
}

#[async_trait::async_trait]
impl AuditLog for StoreBackend {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditLogError> {
        match self {
            StoreBackend::Sqlite(s) => s.record(event).await,
            StoreBackend::Postgres(s) => s.record(event).await,
        }
    }

    async fn query(&self, filter: AuditLogFilter) -> Result<Vec<AuditEvent>, AuditLogError> {
        match self {
            StoreBackend::Sqlite(s) => s.query(filter).await,
            StoreBackend::Postgres(s) => s.query(filter).await,
        }
    }

    async fn get(&self, id: AuditLogId) -> Result<AuditEvent, AuditLogError> {
        match self {
            StoreBackend::Sqlite(s) => s.get(id).await,
            StoreBackend::Postgres(s) => s.get(id).await,
        }
    }

    async fn count(&self, filter: AuditLogFilter) -> Result<u64, AuditLogError> {
        match self {
            StoreBackend::Sqlite(s) => s.count(filter).await,
            StoreBackend::Postgres(s) => s.count(filter).await,
        }
    }
}
