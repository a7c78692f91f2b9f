use std::str::FromStr;

use chrono::{DateTime, Utc};
use signoff_audit::{
    AuditAction, AuditEvent, AuditLog, AuditLogError, AuditLogFilter, AuditLogId, AuditResult,
};
use signoff_storage::{
    CreateEditRequestParams, CreateEvidenceParams, CreateMagicLinkParams, CreateSessionParams,
    CreateUserParams, DecideEditRequestParams, EditRequest, EditRequestId, EditRequestStatus,
    Evidence, EvidenceId, EvidenceKind, EvidenceStatus, EvidenceUpdate, MagicLink, MagicLinkId,
    Session, Store, StoreError, SupervisorIdentity, User, UserId,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use uuid::Uuid;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const EVIDENCE_COLUMNS: &str = "id,owner_id,kind,status,payload,supervisor,signed_off_at,\
                                unlocked_fields,version,created_at,updated_at";
const LINK_COLUMNS: &str = "id,token_hash,evidence_id,recipient_email,recipient_credential_id,\
                            kind,created_by,created_at,expires_at,used_at";
const EDIT_REQUEST_COLUMNS: &str =
    "id,evidence_id,requested_by,fields,reason,status,decided_by,decided_at,created_at";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open("sqlite::memory:").await
    }

    /// Open (creating if missing) and migrate the database at `url`.
    ///
    /// A single connection serialises every transaction, which is what the conditional
    /// writes below rely on.
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(backend)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(backend)?;

        MIGRATOR.run(&pool).await.map_err(backend)?;

        Ok(Self { pool })
    }

    /// Underlying pool, for tests that need raw SQL access.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// ───────────────────────────── Row mapping ─────────────────────────────

fn backend<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn unique_or_backend(e: sqlx::Error) -> StoreError {
    let s = e.to_string();
    if s.contains("UNIQUE") || s.contains("PRIMARY KEY") {
        StoreError::AlreadyExists
    } else {
        StoreError::Backend(s)
    }
}

fn ms(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

fn from_ms(v: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(v)
        .ok_or_else(|| StoreError::Backend(format!("invalid timestamp: {}", v)))
}

fn opt_from_ms(v: Option<i64>) -> Result<Option<DateTime<Utc>>, StoreError> {
    v.map(from_ms).transpose()
}

fn uuid_col(row: &SqliteRow, col: &str) -> Result<Uuid, StoreError> {
    let s: String = row.try_get(col).map_err(backend)?;
    Uuid::try_parse(&s).map_err(backend)
}

fn opt_uuid_col(row: &SqliteRow, col: &str) -> Result<Option<Uuid>, StoreError> {
    let s: Option<String> = row.try_get(col).map_err(backend)?;
    s.map(|s| Uuid::try_parse(&s).map_err(backend)).transpose()
}

fn user_from_row(row: &SqliteRow) -> Result<User, StoreError> {
    Ok(User {
        id: UserId(uuid_col(row, "id")?),
        email: row.try_get("email").map_err(backend)?,
        name: row.try_get("name").map_err(backend)?,
        credential_id: row.try_get("credential_id").map_err(backend)?,
        created_at: from_ms(row.try_get("created_at").map_err(backend)?)?,
    })
}

fn session_from_row(row: &SqliteRow) -> Result<Session, StoreError> {
    Ok(Session {
        token_hash: row.try_get("token_hash").map_err(backend)?,
        user_id: UserId(uuid_col(row, "user_id")?),
        created_at: from_ms(row.try_get("created_at").map_err(backend)?)?,
        expires_at: from_ms(row.try_get("expires_at").map_err(backend)?)?,
    })
}

fn evidence_from_row(row: &SqliteRow) -> Result<Evidence, StoreError> {
    let kind: String = row.try_get("kind").map_err(backend)?;
    let status: String = row.try_get("status").map_err(backend)?;
    let payload: String = row.try_get("payload").map_err(backend)?;
    let supervisor: Option<String> = row.try_get("supervisor").map_err(backend)?;
    let unlocked: String = row.try_get("unlocked_fields").map_err(backend)?;

    Ok(Evidence {
        id: EvidenceId(uuid_col(row, "id")?),
        owner_id: UserId(uuid_col(row, "owner_id")?),
        kind: EvidenceKind::from_str(&kind).map_err(backend)?,
        status: EvidenceStatus::from_str(&status).map_err(backend)?,
        payload: serde_json::from_str(&payload).map_err(backend)?,
        supervisor: supervisor
            .map(|s| serde_json::from_str::<SupervisorIdentity>(&s).map_err(backend))
            .transpose()?,
        signed_off_at: opt_from_ms(row.try_get("signed_off_at").map_err(backend)?)?,
        unlocked_fields: serde_json::from_str(&unlocked).map_err(backend)?,
        version: row.try_get("version").map_err(backend)?,
        created_at: from_ms(row.try_get("created_at").map_err(backend)?)?,
        updated_at: from_ms(row.try_get("updated_at").map_err(backend)?)?,
    })
}

fn link_from_row(row: &SqliteRow) -> Result<MagicLink, StoreError> {
    let kind: String = row.try_get("kind").map_err(backend)?;
    Ok(MagicLink {
        id: MagicLinkId(uuid_col(row, "id")?),
        token_hash: row.try_get("token_hash").map_err(backend)?,
        evidence_id: EvidenceId(uuid_col(row, "evidence_id")?),
        recipient_email: row.try_get("recipient_email").map_err(backend)?,
        recipient_credential_id: row.try_get("recipient_credential_id").map_err(backend)?,
        kind: EvidenceKind::from_str(&kind).map_err(backend)?,
        created_by: UserId(uuid_col(row, "created_by")?),
        created_at: from_ms(row.try_get("created_at").map_err(backend)?)?,
        expires_at: from_ms(row.try_get("expires_at").map_err(backend)?)?,
        used_at: opt_from_ms(row.try_get("used_at").map_err(backend)?)?,
    })
}

fn edit_request_from_row(row: &SqliteRow) -> Result<EditRequest, StoreError> {
    let fields: String = row.try_get("fields").map_err(backend)?;
    let status: String = row.try_get("status").map_err(backend)?;
    Ok(EditRequest {
        id: EditRequestId(uuid_col(row, "id")?),
        evidence_id: EvidenceId(uuid_col(row, "evidence_id")?),
        requested_by: UserId(uuid_col(row, "requested_by")?),
        fields: serde_json::from_str(&fields).map_err(backend)?,
        reason: row.try_get("reason").map_err(backend)?,
        status: EditRequestStatus::from_str(&status).map_err(StoreError::Backend)?,
        decided_by: opt_uuid_col(row, "decided_by")?.map(UserId),
        decided_at: opt_from_ms(row.try_get("decided_at").map_err(backend)?)?,
        created_at: from_ms(row.try_get("created_at").map_err(backend)?)?,
    })
}

fn audit_from_row(row: &SqliteRow) -> Result<AuditEvent, AuditLogError> {
    let db = |e: sqlx::Error| AuditLogError::Database(e.to_string());
    let parse_uuid = |s: Option<String>| -> Result<Option<Uuid>, AuditLogError> {
        s.map(|s| Uuid::try_parse(&s).map_err(|e| AuditLogError::Database(e.to_string())))
            .transpose()
    };

    let id: String = row.try_get("id").map_err(db)?;
    let timestamp: i64 = row.try_get("timestamp").map_err(db)?;
    let action: String = row.try_get("action").map_err(db)?;
    let result: String = row.try_get("result").map_err(db)?;
    let details: Option<String> = row.try_get("details").map_err(db)?;

    Ok(AuditEvent {
        id: id
            .parse::<AuditLogId>()
            .map_err(|e| AuditLogError::Database(e.to_string()))?,
        timestamp: DateTime::from_timestamp_millis(timestamp)
            .ok_or_else(|| AuditLogError::Database(format!("invalid timestamp: {}", timestamp)))?,
        actor_id: parse_uuid(row.try_get("actor_id").map_err(db)?)?,
        actor_email: row.try_get("actor_email").map_err(db)?,
        action: action.parse::<AuditAction>().map_err(AuditLogError::Database)?,
        evidence_id: parse_uuid(row.try_get("evidence_id").map_err(db)?)?,
        result: result.parse::<AuditResult>().map_err(AuditLogError::Database)?,
        reason: row.try_get("reason").map_err(db)?,
        details: details
            .map(|d| serde_json::from_str(&d).map_err(|e| AuditLogError::Database(e.to_string())))
            .transpose()?,
    })
}

// ───────────────────────────── Connection-level helpers ─────────────────────────────
//
// These take a connection rather than the pool so they can run inside a transaction
// (the pool has a single connection; re-entering it would deadlock).

async fn fetch_evidence(
    conn: &mut SqliteConnection,
    id: &EvidenceId,
) -> Result<Option<Evidence>, StoreError> {
    let sql = format!("SELECT {} FROM evidence WHERE id=?", EVIDENCE_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.0.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(backend)?;
    row.as_ref().map(evidence_from_row).transpose()
}

async fn fetch_link(
    conn: &mut SqliteConnection,
    id: &MagicLinkId,
) -> Result<Option<MagicLink>, StoreError> {
    let sql = format!("SELECT {} FROM magic_links WHERE id=?", LINK_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.0.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(backend)?;
    row.as_ref().map(link_from_row).transpose()
}

async fn fetch_edit_request(
    conn: &mut SqliteConnection,
    id: &EditRequestId,
) -> Result<Option<EditRequest>, StoreError> {
    let sql = format!("SELECT {} FROM edit_requests WHERE id=?", EDIT_REQUEST_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.0.to_string())
        .fetch_optional(&mut *conn)
        .await
        .map_err(backend)?;
    row.as_ref().map(edit_request_from_row).transpose()
}

/// Compare-and-set on (version, status). Returns the stored row after the write.
async fn apply_update(
    conn: &mut SqliteConnection,
    u: &EvidenceUpdate,
) -> Result<Evidence, StoreError> {
    let supervisor = u
        .supervisor
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(backend)?;
    let unlocked = serde_json::to_string(&u.unlocked_fields).map_err(backend)?;

    let result = sqlx::query(
        "UPDATE evidence
            SET status=?, payload=?, supervisor=?, signed_off_at=?, unlocked_fields=?,
                version=version+1, updated_at=?
          WHERE id=? AND version=? AND status=?",
    )
    .bind(u.status.as_str())
    .bind(u.payload.to_string())
    .bind(supervisor)
    .bind(u.signed_off_at.map(ms))
    .bind(unlocked)
    .bind(ms(u.updated_at))
    .bind(u.id.0.to_string())
    .bind(u.expected_version)
    .bind(u.expected_status.as_str())
    .execute(&mut *conn)
    .await
    .map_err(backend)?;

    if result.rows_affected() == 0 {
        return match fetch_evidence(conn, &u.id).await? {
            None => Err(StoreError::NotFound),
            Some(_) => Err(StoreError::Conflict),
        };
    }

    fetch_evidence(conn, &u.id).await?.ok_or(StoreError::NotFound)
}

async fn insert_link(
    conn: &mut SqliteConnection,
    p: &CreateMagicLinkParams,
) -> Result<MagicLink, StoreError> {
    let id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO magic_links(id,token_hash,evidence_id,recipient_email,
                                 recipient_credential_id,kind,created_by,created_at,expires_at)
         VALUES(?,?,?,?,?,?,?,?,?)",
    )
    .bind(id.to_string())
    .bind(&p.token_hash)
    .bind(p.evidence_id.0.to_string())
    .bind(&p.recipient_email)
    .bind(&p.recipient_credential_id)
    .bind(p.kind.as_str())
    .bind(p.created_by.0.to_string())
    .bind(ms(p.created_at))
    .bind(ms(p.expires_at))
    .execute(&mut *conn)
    .await
    .map_err(unique_or_backend)?;

    fetch_link(conn, &MagicLinkId(id))
        .await?
        .ok_or(StoreError::NotFound)
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    // ───────────────────────────── Users ─────────────────────────────

    async fn create_user(&self, params: &CreateUserParams) -> Result<User, StoreError> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        sqlx::query("INSERT INTO users(id,email,name,credential_id,created_at) VALUES(?,?,?,?,?)")
            .bind(id.to_string())
            .bind(&params.email)
            .bind(&params.name)
            .bind(&params.credential_id)
            .bind(ms(now))
            .execute(&self.pool)
            .await
            .map_err(unique_or_backend)?;
        self.get_user_by_id(&UserId(id)).await
    }

    async fn get_user_by_id(&self, user_id: &UserId) -> Result<User, StoreError> {
        let row = sqlx::query("SELECT id,email,name,credential_id,created_at FROM users WHERE id=?")
            .bind(user_id.0.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        match row {
            None => Err(StoreError::NotFound),
            Some(row) => user_from_row(&row),
        }
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let row = sqlx::query(
            "SELECT id,email,name,credential_id,created_at FROM users WHERE email=? COLLATE NOCASE",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        match row {
            None => Err(StoreError::NotFound),
            Some(row) => user_from_row(&row),
        }
    }

    // ───────────────────────────── Sessions ─────────────────────────────

    async fn create_session(&self, params: &CreateSessionParams) -> Result<Session, StoreError> {
        let now = Utc::now();
        sqlx::query("INSERT INTO sessions(token_hash,user_id,created_at,expires_at) VALUES(?,?,?,?)")
            .bind(&params.token_hash)
            .bind(params.user_id.0.to_string())
            .bind(ms(now))
            .bind(ms(params.expires_at))
            .execute(&self.pool)
            .await
            .map_err(unique_or_backend)?;
        self.get_session(&params.token_hash).await
    }

    async fn get_session(&self, token_hash: &str) -> Result<Session, StoreError> {
        let row = sqlx::query(
            "SELECT token_hash,user_id,created_at,expires_at FROM sessions WHERE token_hash=?",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        match row {
            None => Err(StoreError::NotFound),
            Some(row) => session_from_row(&row),
        }
    }

    // ───────────────────────────── Evidence ─────────────────────────────

    async fn create_evidence(
        &self,
        params: &CreateEvidenceParams,
    ) -> Result<Evidence, StoreError> {
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO evidence(id,owner_id,kind,status,payload,version,created_at,updated_at)
             VALUES(?,?,?,'draft',?,1,?,?)",
        )
        .bind(id.to_string())
        .bind(params.owner_id.0.to_string())
        .bind(params.kind.as_str())
        .bind(params.payload.to_string())
        .bind(ms(params.created_at))
        .bind(ms(params.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let s = e.to_string();
            if s.contains("FOREIGN KEY") {
                StoreError::NotFound
            } else {
                StoreError::Backend(s)
            }
        })?;
        self.get_evidence(&EvidenceId(id)).await
    }

    async fn get_evidence(&self, id: &EvidenceId) -> Result<Evidence, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        fetch_evidence(&mut conn, id)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn update_evidence(&self, update: &EvidenceUpdate) -> Result<Evidence, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        apply_update(&mut conn, update).await
    }

    async fn add_evidence_link(
        &self,
        evidence_id: &EvidenceId,
        linked_id: &EvidenceId,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO evidence_links(evidence_id,linked_evidence_id,created_at) VALUES(?,?,?)",
        )
        .bind(evidence_id.0.to_string())
        .bind(linked_id.0.to_string())
        .bind(ms(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let s = e.to_string();
            if s.contains("FOREIGN KEY") {
                StoreError::NotFound
            } else if s.contains("UNIQUE") || s.contains("PRIMARY KEY") {
                StoreError::AlreadyExists
            } else {
                StoreError::Backend(s)
            }
        })?;
        Ok(())
    }

    async fn list_linked_evidence(
        &self,
        evidence_id: &EvidenceId,
    ) -> Result<Vec<Evidence>, StoreError> {
        let sql = format!(
            "SELECT {} FROM evidence e
               JOIN evidence_links l ON l.linked_evidence_id = e.id
              WHERE l.evidence_id=?
              ORDER BY l.created_at, e.id",
            EVIDENCE_COLUMNS
                .split(',')
                .map(|c| format!("e.{}", c))
                .collect::<Vec<_>>()
                .join(",")
        );
        let rows = sqlx::query(&sql)
            .bind(evidence_id.0.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(evidence_from_row).collect()
    }

    // ───────────────────────────── Magic Links ─────────────────────────────

    async fn create_magic_link(
        &self,
        params: &CreateMagicLinkParams,
    ) -> Result<MagicLink, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        insert_link(&mut conn, params).await
    }

    async fn get_magic_link_by_token_hash(
        &self,
        token_hash: &str,
    ) -> Result<MagicLink, StoreError> {
        let sql = format!("SELECT {} FROM magic_links WHERE token_hash=?", LINK_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        match row {
            None => Err(StoreError::NotFound),
            Some(row) => link_from_row(&row),
        }
    }

    async fn list_magic_links_for_evidence(
        &self,
        evidence_id: &EvidenceId,
    ) -> Result<Vec<MagicLink>, StoreError> {
        let sql = format!(
            "SELECT {} FROM magic_links WHERE evidence_id=? ORDER BY created_at DESC, id DESC",
            LINK_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(evidence_id.0.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(link_from_row).collect()
    }

    async fn submit_with_link(
        &self,
        update: &EvidenceUpdate,
        link: &CreateMagicLinkParams,
    ) -> Result<(Evidence, MagicLink), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let evidence = apply_update(&mut tx, update).await?;
        let link = insert_link(&mut tx, link).await?;

        tx.commit().await.map_err(backend)?;
        Ok((evidence, link))
    }

    async fn sign_off_with_link(
        &self,
        update: &EvidenceUpdate,
        link_id: &MagicLinkId,
        used_at: DateTime<Utc>,
    ) -> Result<Evidence, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let consumed = sqlx::query(
            "UPDATE magic_links SET used_at=?
              WHERE id=? AND evidence_id=? AND used_at IS NULL AND expires_at > ?",
        )
        .bind(ms(used_at))
        .bind(link_id.0.to_string())
        .bind(update.id.0.to_string())
        .bind(ms(used_at))
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        if consumed.rows_affected() == 0 {
            // Dropping `tx` rolls back.
            return Err(StoreError::Conflict);
        }

        let evidence = apply_update(&mut tx, update).await?;

        tx.commit().await.map_err(backend)?;
        Ok(evidence)
    }

    // ───────────────────────────── Edit Requests ─────────────────────────────

    async fn create_edit_request(
        &self,
        params: &CreateEditRequestParams,
    ) -> Result<EditRequest, StoreError> {
        let id = Uuid::now_v7();
        let fields = serde_json::to_string(&params.fields).map_err(backend)?;
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        sqlx::query(
            "INSERT INTO edit_requests(id,evidence_id,requested_by,fields,reason,status,created_at)
             VALUES(?,?,?,?,?,'pending',?)",
        )
        .bind(id.to_string())
        .bind(params.evidence_id.0.to_string())
        .bind(params.requested_by.0.to_string())
        .bind(fields)
        .bind(&params.reason)
        .bind(ms(params.created_at))
        .execute(&mut *conn)
        .await
        .map_err(backend)?;

        fetch_edit_request(&mut conn, &EditRequestId(id))
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn get_edit_request(&self, id: &EditRequestId) -> Result<EditRequest, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        fetch_edit_request(&mut conn, id)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn list_edit_requests(
        &self,
        evidence_id: &EvidenceId,
    ) -> Result<Vec<EditRequest>, StoreError> {
        let sql = format!(
            "SELECT {} FROM edit_requests WHERE evidence_id=? ORDER BY created_at DESC, id DESC",
            EDIT_REQUEST_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(evidence_id.0.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(edit_request_from_row).collect()
    }

    async fn approve_edit_request(
        &self,
        decision: &DecideEditRequestParams,
        update: &EvidenceUpdate,
    ) -> Result<(EditRequest, Evidence), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let decided = sqlx::query(
            "UPDATE edit_requests SET status='approved', decided_by=?, decided_at=?
              WHERE id=? AND evidence_id=? AND status='pending'",
        )
        .bind(decision.decided_by.0.to_string())
        .bind(ms(decision.decided_at))
        .bind(decision.id.0.to_string())
        .bind(update.id.0.to_string())
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        if decided.rows_affected() == 0 {
            return match fetch_edit_request(&mut tx, &decision.id).await? {
                None => Err(StoreError::NotFound),
                Some(_) => Err(StoreError::Conflict),
            };
        }

        let evidence = apply_update(&mut tx, update).await?;
        let request = fetch_edit_request(&mut tx, &decision.id)
            .await?
            .ok_or(StoreError::NotFound)?;

        tx.commit().await.map_err(backend)?;
        Ok((request, evidence))
    }

    async fn deny_edit_request(
        &self,
        decision: &DecideEditRequestParams,
    ) -> Result<EditRequest, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        let decided = sqlx::query(
            "UPDATE edit_requests SET status='denied', decided_by=?, decided_at=?
              WHERE id=? AND status='pending'",
        )
        .bind(decision.decided_by.0.to_string())
        .bind(ms(decision.decided_at))
        .bind(decision.id.0.to_string())
        .execute(&mut *conn)
        .await
        .map_err(backend)?;

        let request = fetch_edit_request(&mut conn, &decision.id)
            .await?
            .ok_or(StoreError::NotFound)?;
        if decided.rows_affected() == 0 {
            return Err(StoreError::Conflict);
        }
        Ok(request)
    }
}

// ───────────────────────────── Audit ─────────────────────────────

fn push_audit_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &AuditLogFilter) {
    qb.push(" WHERE 1=1");
    if let Some(actor) = &filter.actor_id {
        qb.push(" AND actor_id=").push_bind(actor.0.to_string());
    }
    if let Some(evidence) = &filter.evidence_id {
        qb.push(" AND evidence_id=").push_bind(evidence.0.to_string());
    }
    if let Some(action) = &filter.action {
        qb.push(" AND action=").push_bind(action.to_string());
    }
    if let Some(result) = &filter.result {
        qb.push(" AND result=").push_bind(result.to_string());
    }
    if let Some(from) = filter.from {
        qb.push(" AND timestamp>=").push_bind(ms(from));
    }
    if let Some(to) = filter.to {
        qb.push(" AND timestamp<").push_bind(ms(to));
    }
}

#[async_trait::async_trait]
impl AuditLog for SqliteStore {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditLogError> {
        let details = event.details.as_ref().map(|d| d.to_string());
        sqlx::query(
            "INSERT INTO audit_logs(id,timestamp,actor_id,actor_email,action,evidence_id,
                                    result,reason,details)
             VALUES(?,?,?,?,?,?,?,?,?)",
        )
        .bind(event.id.to_string())
        .bind(ms(event.timestamp))
        .bind(event.actor_id.map(|u| u.to_string()))
        .bind(&event.actor_email)
        .bind(event.action.to_string())
        .bind(event.evidence_id.map(|u| u.to_string()))
        .bind(event.result.to_string())
        .bind(&event.reason)
        .bind(details)
        .execute(&self.pool)
        .await
        .map_err(|e| AuditLogError::Database(e.to_string()))?;
        Ok(())
    }

    async fn query(&self, filter: AuditLogFilter) -> Result<Vec<AuditEvent>, AuditLogError> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id,timestamp,actor_id,actor_email,action,evidence_id,result,reason,details \
             FROM audit_logs",
        );
        push_audit_filter(&mut qb, &filter);
        qb.push(" ORDER BY timestamp DESC, id DESC");
        qb.push(" LIMIT ")
            .push_bind(filter.limit.map(i64::from).unwrap_or(-1));
        qb.push(" OFFSET ")
            .push_bind(filter.offset.map(i64::from).unwrap_or(0));

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AuditLogError::Database(e.to_string()))?;
        rows.iter().map(audit_from_row).collect()
    }

    async fn get(&self, id: AuditLogId) -> Result<AuditEvent, AuditLogError> {
        let row = sqlx::query(
            "SELECT id,timestamp,actor_id,actor_email,action,evidence_id,result,reason,details
               FROM audit_logs WHERE id=?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuditLogError::Database(e.to_string()))?;
        match row {
            None => Err(AuditLogError::NotFound(id)),
            Some(row) => audit_from_row(&row),
        }
    }

    async fn count(&self, filter: AuditLogFilter) -> Result<u64, AuditLogError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM audit_logs");
        push_audit_filter(&mut qb, &filter);
        let (n,): (i64,) = qb
            .build_query_as::<(i64,)>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AuditLogError::Database(e.to_string()))?;
        Ok(n as u64)
    }
}
