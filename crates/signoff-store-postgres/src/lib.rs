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
use sqlx::postgres::{PgConnection, PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

const EVIDENCE_COLUMNS: &str = "id,owner_id,kind,status,payload,supervisor,signed_off_at,\
                                unlocked_fields,version,created_at,updated_at";
const LINK_COLUMNS: &str = "id,token_hash,evidence_id,recipient_email,recipient_credential_id,\
                            kind,created_by,created_at,expires_at,used_at";
const EDIT_REQUEST_COLUMNS: &str =
    "id,evidence_id,requested_by,fields,reason,status,decided_by,decided_at,created_at";
const AUDIT_COLUMNS: &str =
    "id,timestamp,actor_id,actor_email,action,evidence_id,result,reason,details";

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { pool })
    }
}

fn backend<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn classify(e: sqlx::Error) -> StoreError {
    let s = e.to_string();
    if s.contains("duplicate key") || s.contains("unique constraint") {
        StoreError::AlreadyExists
    } else if s.contains("foreign key constraint") {
        StoreError::NotFound
    } else {
        StoreError::Backend(s)
    }
}

fn evidence_from_row(row: &PgRow) -> Result<Evidence, StoreError> {
    let kind: String = row.try_get("kind").map_err(backend)?;
    let status: String = row.try_get("status").map_err(backend)?;
    let supervisor: Option<serde_json::Value> = row.try_get("supervisor").map_err(backend)?;

    Ok(Evidence {
        id: EvidenceId(row.try_get("id").map_err(backend)?),
        owner_id: UserId(row.try_get("owner_id").map_err(backend)?),
        kind: EvidenceKind::from_str(&kind).map_err(backend)?,
        status: EvidenceStatus::from_str(&status).map_err(backend)?,
        payload: row.try_get("payload").map_err(backend)?,
        supervisor: supervisor
            .map(serde_json::from_value::<SupervisorIdentity>)
            .transpose()
            .map_err(backend)?,
        signed_off_at: row.try_get("signed_off_at").map_err(backend)?,
        unlocked_fields: row.try_get("unlocked_fields").map_err(backend)?,
        version: row.try_get("version").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

fn link_from_row(row: &PgRow) -> Result<MagicLink, StoreError> {
    let kind: String = row.try_get("kind").map_err(backend)?;
    Ok(MagicLink {
        id: MagicLinkId(row.try_get("id").map_err(backend)?),
        token_hash: row.try_get("token_hash").map_err(backend)?,
        evidence_id: EvidenceId(row.try_get("evidence_id").map_err(backend)?),
        recipient_email: row.try_get("recipient_email").map_err(backend)?,
        recipient_credential_id: row.try_get("recipient_credential_id").map_err(backend)?,
        kind: EvidenceKind::from_str(&kind).map_err(backend)?,
        created_by: UserId(row.try_get("created_by").map_err(backend)?),
        created_at: row.try_get("created_at").map_err(backend)?,
        expires_at: row.try_get("expires_at").map_err(backend)?,
        used_at: row.try_get("used_at").map_err(backend)?,
    })
}

fn edit_request_from_row(row: &PgRow) -> Result<EditRequest, StoreError> {
    let status: String = row.try_get("status").map_err(backend)?;
    let decided_by: Option<Uuid> = row.try_get("decided_by").map_err(backend)?;
    Ok(EditRequest {
        id: EditRequestId(row.try_get("id").map_err(backend)?),
        evidence_id: EvidenceId(row.try_get("evidence_id").map_err(backend)?),
        requested_by: UserId(row.try_get("requested_by").map_err(backend)?),
        fields: row.try_get("fields").map_err(backend)?,
        reason: row.try_get("reason").map_err(backend)?,
        status: EditRequestStatus::from_str(&status).map_err(StoreError::Backend)?,
        decided_by: decided_by.map(UserId),
        decided_at: row.try_get("decided_at").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    Ok(User {
        id: UserId(row.try_get("id").map_err(backend)?),
        email: row.try_get("email").map_err(backend)?,
        name: row.try_get("name").map_err(backend)?,
        credential_id: row.try_get("credential_id").map_err(backend)?,
        created_at: row.try_get("created_at").map_err(backend)?,
    })
}

async fn fetch_evidence(
    conn: &mut PgConnection,
    id: &EvidenceId,
) -> Result<Option<Evidence>, StoreError> {
    let sql = format!("SELECT {} FROM evidence WHERE id = $1", EVIDENCE_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await
        .map_err(backend)?;
    row.as_ref().map(evidence_from_row).transpose()
}

async fn fetch_edit_request(
    conn: &mut PgConnection,
    id: &EditRequestId,
) -> Result<Option<EditRequest>, StoreError> {
    let sql = format!("SELECT {} FROM edit_requests WHERE id = $1", EDIT_REQUEST_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await
        .map_err(backend)?;
    row.as_ref().map(edit_request_from_row).transpose()
}

/// Compare-and-set on (version, status), returning the updated row.
async fn apply_update(conn: &mut PgConnection, u: &EvidenceUpdate) -> Result<Evidence, StoreError> {
    let supervisor = u
        .supervisor
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(backend)?;

    let sql = format!(
        "UPDATE evidence
            SET status = $1, payload = $2, supervisor = $3, signed_off_at = $4,
                unlocked_fields = $5, version = version + 1, updated_at = $6
          WHERE id = $7 AND version = $8 AND status = $9
      RETURNING {}",
        EVIDENCE_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(u.status.as_str())
        .bind(&u.payload)
        .bind(supervisor)
        .bind(u.signed_off_at)
        .bind(&u.unlocked_fields)
        .bind(u.updated_at)
        .bind(u.id.0)
        .bind(u.expected_version)
        .bind(u.expected_status.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(backend)?;

    match row {
        Some(row) => evidence_from_row(&row),
        None => match fetch_evidence(conn, &u.id).await? {
            None => Err(StoreError::NotFound),
            Some(_) => Err(StoreError::Conflict),
        },
    }
}

async fn insert_link(
    conn: &mut PgConnection,
    p: &CreateMagicLinkParams,
) -> Result<MagicLink, StoreError> {
    let sql = format!(
        "INSERT INTO magic_links(id, token_hash, evidence_id, recipient_email,
                                 recipient_credential_id, kind, created_by, created_at, expires_at)
         VALUES($1, $2, $3, $4, $5, $6, $7, $8, $9)
         RETURNING {}",
        LINK_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(Uuid::now_v7())
        .bind(&p.token_hash)
        .bind(p.evidence_id.0)
        .bind(&p.recipient_email)
        .bind(&p.recipient_credential_id)
        .bind(p.kind.as_str())
        .bind(p.created_by.0)
        .bind(p.created_at)
        .bind(p.expires_at)
        .fetch_one(&mut *conn)
        .await
        .map_err(classify)?;
    link_from_row(&row)
}

#[async_trait::async_trait]
impl Store for PostgresStore {
    // ───────────────────────────── Users ─────────────────────────────

    async fn create_user(&self, params: &CreateUserParams) -> Result<User, StoreError> {
        let row = sqlx::query(
            "INSERT INTO users(id, email, name, credential_id) VALUES($1, $2, $3, $4)
             RETURNING id, email, name, credential_id, created_at",
        )
        .bind(Uuid::now_v7())
        .bind(&params.email)
        .bind(&params.name)
        .bind(&params.credential_id)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;
        user_from_row(&row)
    }

    async fn get_user_by_id(&self, user_id: &UserId) -> Result<User, StoreError> {
        let row = sqlx::query(
            "SELECT id, email, name, credential_id, created_at FROM users WHERE id = $1",
        )
        .bind(user_id.0)
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
            "SELECT id, email, name, credential_id, created_at FROM users
              WHERE lower(email) = lower($1)",
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
        let row = sqlx::query(
            "INSERT INTO sessions(token_hash, user_id, expires_at) VALUES($1, $2, $3)
             RETURNING token_hash, user_id, created_at, expires_at",
        )
        .bind(&params.token_hash)
        .bind(params.user_id.0)
        .bind(params.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;
        Ok(Session {
            token_hash: row.try_get("token_hash").map_err(backend)?,
            user_id: UserId(row.try_get("user_id").map_err(backend)?),
            created_at: row.try_get("created_at").map_err(backend)?,
            expires_at: row.try_get("expires_at").map_err(backend)?,
        })
    }

    async fn get_session(&self, token_hash: &str) -> Result<Session, StoreError> {
        let row = sqlx::query(
            "SELECT token_hash, user_id, created_at, expires_at FROM sessions
              WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?
        .ok_or(StoreError::NotFound)?;
        Ok(Session {
            token_hash: row.try_get("token_hash").map_err(backend)?,
            user_id: UserId(row.try_get("user_id").map_err(backend)?),
            created_at: row.try_get("created_at").map_err(backend)?,
            expires_at: row.try_get("expires_at").map_err(backend)?,
        })
    }

    // ───────────────────────────── Evidence ─────────────────────────────

    async fn create_evidence(
        &self,
        params: &CreateEvidenceParams,
    ) -> Result<Evidence, StoreError> {
        let sql = format!(
            "INSERT INTO evidence(id, owner_id, kind, status, payload, version, created_at, updated_at)
             VALUES($1, $2, $3, 'draft', $4, 1, $5, $5)
             RETURNING {}",
            EVIDENCE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::now_v7())
            .bind(params.owner_id.0)
            .bind(params.kind.as_str())
            .bind(&params.payload)
            .bind(params.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        evidence_from_row(&row)
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
        sqlx::query("INSERT INTO evidence_links(evidence_id, linked_evidence_id) VALUES($1, $2)")
            .bind(evidence_id.0)
            .bind(linked_id.0)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn list_linked_evidence(
        &self,
        evidence_id: &EvidenceId,
    ) -> Result<Vec<Evidence>, StoreError> {
        let columns = EVIDENCE_COLUMNS
            .split(',')
            .map(|c| format!("e.{}", c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM evidence e
               JOIN evidence_links l ON l.linked_evidence_id = e.id
              WHERE l.evidence_id = $1
              ORDER BY l.created_at, e.id",
            columns
        );
        let rows = sqlx::query(&sql)
            .bind(evidence_id.0)
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
        let sql = format!("SELECT {} FROM magic_links WHERE token_hash = $1", LINK_COLUMNS);
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
            "SELECT {} FROM magic_links WHERE evidence_id = $1 ORDER BY created_at DESC, id DESC",
            LINK_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(evidence_id.0)
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
            "UPDATE magic_links SET used_at = $1
              WHERE id = $2 AND evidence_id = $3 AND used_at IS NULL AND expires_at > $1",
        )
        .bind(used_at)
        .bind(link_id.0)
        .bind(update.id.0)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        if consumed.rows_affected() == 0 {
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
        let sql = format!(
            "INSERT INTO edit_requests(id, evidence_id, requested_by, fields, reason, status, created_at)
             VALUES($1, $2, $3, $4, $5, 'pending', $6)
             RETURNING {}",
            EDIT_REQUEST_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::now_v7())
            .bind(params.evidence_id.0)
            .bind(params.requested_by.0)
            .bind(&params.fields)
            .bind(&params.reason)
            .bind(params.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        edit_request_from_row(&row)
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
            "SELECT {} FROM edit_requests WHERE evidence_id = $1 ORDER BY created_at DESC, id DESC",
            EDIT_REQUEST_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(evidence_id.0)
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

        let sql = format!(
            "UPDATE edit_requests SET status = 'approved', decided_by = $1, decided_at = $2
              WHERE id = $3 AND evidence_id = $4 AND status = 'pending'
          RETURNING {}",
            EDIT_REQUEST_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(decision.decided_by.0)
            .bind(decision.decided_at)
            .bind(decision.id.0)
            .bind(update.id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?;

        let request = match row {
            Some(row) => edit_request_from_row(&row)?,
            None => {
                return match fetch_edit_request(&mut tx, &decision.id).await? {
                    None => Err(StoreError::NotFound),
                    Some(_) => Err(StoreError::Conflict),
                }
            }
        };

        let evidence = apply_update(&mut tx, update).await?;

        tx.commit().await.map_err(backend)?;
        Ok((request, evidence))
    }

    async fn deny_edit_request(
        &self,
        decision: &DecideEditRequestParams,
    ) -> Result<EditRequest, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        let sql = format!(
            "UPDATE edit_requests SET status = 'denied', decided_by = $1, decided_at = $2
              WHERE id = $3 AND status = 'pending'
          RETURNING {}",
            EDIT_REQUEST_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(decision.decided_by.0)
            .bind(decision.decided_at)
            .bind(decision.id.0)
            .fetch_optional(&mut *conn)
            .await
            .map_err(backend)?;

        match row {
            Some(row) => edit_request_from_row(&row),
            None => match fetch_edit_request(&mut conn, &decision.id).await? {
                None => Err(StoreError::NotFound),
                Some(_) => Err(StoreError::Conflict),
            },
        }
    }
}

// ───────────────────────────── Audit ─────────────────────────────

fn push_audit_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &AuditLogFilter) {
    qb.push(" WHERE TRUE");
    if let Some(actor) = &filter.actor_id {
        qb.push(" AND actor_id = ").push_bind(actor.0);
    }
    if let Some(evidence) = &filter.evidence_id {
        qb.push(" AND evidence_id = ").push_bind(evidence.0);
    }
    if let Some(action) = &filter.action {
        qb.push(" AND action = ").push_bind(action.to_string());
    }
    if let Some(result) = &filter.result {
        qb.push(" AND result = ").push_bind(result.to_string());
    }
    if let Some(from) = filter.from {
        qb.push(" AND timestamp >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND timestamp < ").push_bind(to);
    }
}

fn audit_from_row(row: &PgRow) -> Result<AuditEvent, AuditLogError> {
    let db = |e: sqlx::Error| AuditLogError::Database(e.to_string());
    let action: String = row.try_get("action").map_err(db)?;
    let result: String = row.try_get("result").map_err(db)?;
    Ok(AuditEvent {
        id: AuditLogId(row.try_get("id").map_err(db)?),
        timestamp: row.try_get("timestamp").map_err(db)?,
        actor_id: row.try_get("actor_id").map_err(db)?,
        actor_email: row.try_get("actor_email").map_err(db)?,
        action: action.parse::<AuditAction>().map_err(AuditLogError::Database)?,
        evidence_id: row.try_get("evidence_id").map_err(db)?,
        result: result.parse::<AuditResult>().map_err(AuditLogError::Database)?,
        reason: row.try_get("reason").map_err(db)?,
        details: row.try_get("details").map_err(db)?,
    })
}

#[async_trait::async_trait]
impl AuditLog for PostgresStore {
    async fn record(&self, event: AuditEvent) -> Result<(), AuditLogError> {
        sqlx::query(
            "INSERT INTO audit_logs(id, timestamp, actor_id, actor_email, action, evidence_id,
                                    result, reason, details)
             VALUES($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(event.id.0)
        .bind(event.timestamp)
        .bind(event.actor_id)
        .bind(&event.actor_email)
        .bind(event.action.to_string())
        .bind(event.evidence_id)
        .bind(event.result.to_string())
        .bind(&event.reason)
        .bind(&event.details)
        .execute(&self.pool)
        .await
        .map_err(|e| AuditLogError::Database(e.to_string()))?;
        Ok(())
    }

    async fn query(&self, filter: AuditLogFilter) -> Result<Vec<AuditEvent>, AuditLogError> {
        let mut qb =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM audit_logs", AUDIT_COLUMNS));
        push_audit_filter(&mut qb, &filter);
        qb.push(" ORDER BY timestamp DESC, id DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(i64::from(limit));
        }
        if let Some(offset) = filter.offset {
            qb.push(" OFFSET ").push_bind(i64::from(offset));
        }

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AuditLogError::Database(e.to_string()))?;
        rows.iter().map(audit_from_row).collect()
    }

    async fn get(&self, id: AuditLogId) -> Result<AuditEvent, AuditLogError> {
        let sql = format!("SELECT {} FROM audit_logs WHERE id = $1", AUDIT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuditLogError::Database(e.to_string()))?;
        match row {
            None => Err(AuditLogError::NotFound(id)),
            Some(row) => audit_from_row(&row),
        }
    }

    async fn count(&self, filter: AuditLogFilter) -> Result<u64, AuditLogError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_logs");
        push_audit_filter(&mut qb, &filter);
        let (n,) = qb
            .build_query_as::<(i64,)>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AuditLogError::Database(e.to_string()))?;
        Ok(n as u64)
    }
}
