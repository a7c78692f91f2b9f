//! Audit trail abstraction for the sign-off workflow.
//!
//! This crate defines the `AuditLog` trait for persisting audit events
//! and the types representing auditable actions on evidence records and magic links.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signoff_storage::{EvidenceId, UserId};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for an audit log entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditLogId(pub Uuid);

impl AuditLogId {
    /// Generate a new audit log ID using UUID v7 (time-ordered)
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AuditLogId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AuditLogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AuditLogId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Categories of auditable actions
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // Evidence lifecycle
    EvidenceCreate,
    EvidenceSave,
    EvidenceSubmit,
    EvidenceSignOff,
    EvidenceDecline,
    EvidenceWithdraw,

    // Magic links
    LinkCreate,
    LinkConsume,
    LinkRefuse,

    // Amendments
    EditRequestCreate,
    EditRequestApprove,
    EditRequestDeny,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditAction::EvidenceCreate => "evidence.create",
            AuditAction::EvidenceSave => "evidence.save",
            AuditAction::EvidenceSubmit => "evidence.submit",
            AuditAction::EvidenceSignOff => "evidence.sign_off",
            AuditAction::EvidenceDecline => "evidence.decline",
            AuditAction::EvidenceWithdraw => "evidence.withdraw",
            AuditAction::LinkCreate => "link.create",
            AuditAction::LinkConsume => "link.consume",
            AuditAction::LinkRefuse => "link.refuse",
            AuditAction::EditRequestCreate => "edit_request.create",
            AuditAction::EditRequestApprove => "edit_request.approve",
            AuditAction::EditRequestDeny => "edit_request.deny",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "evidence.create" => Ok(AuditAction::EvidenceCreate),
            "evidence.save" => Ok(AuditAction::EvidenceSave),
            "evidence.submit" => Ok(AuditAction::EvidenceSubmit),
            "evidence.sign_off" => Ok(AuditAction::EvidenceSignOff),
            "evidence.decline" => Ok(AuditAction::EvidenceDecline),
            "evidence.withdraw" => Ok(AuditAction::EvidenceWithdraw),
            "link.create" => Ok(AuditAction::LinkCreate),
            "link.consume" => Ok(AuditAction::LinkConsume),
            "link.refuse" => Ok(AuditAction::LinkRefuse),
            "edit_request.create" => Ok(AuditAction::EditRequestCreate),
            "edit_request.approve" => Ok(AuditAction::EditRequestApprove),
            "edit_request.deny" => Ok(AuditAction::EditRequestDeny),
            _ => Err(format!("Unknown audit action: {}", s)),
        }
    }
}

/// Result of an audited operation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Success,
    Refused,
    Error,
}

impl std::fmt::Display for AuditResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditResult::Success => "success",
            AuditResult::Refused => "refused",
            AuditResult::Error => "error",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for AuditResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(AuditResult::Success),
            "refused" => Ok(AuditResult::Refused),
            "error" => Ok(AuditResult::Error),
            _ => Err(format!("Unknown audit result: {}", s)),
        }
    }
}

/// An audit log entry representing a single auditable action.
///
/// Uses raw UUIDs for serialization compatibility. Use the builder
/// to construct events from typed IDs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique identifier for this audit entry
    pub id: AuditLogId,
    /// When the action occurred
    pub timestamp: DateTime<Utc>,
    /// Account that performed the action (None for magic-link holders)
    pub actor_id: Option<Uuid>,
    /// Email of the actor; for link holders this is the link's recipient
    pub actor_email: Option<String>,
    /// The action that was performed
    pub action: AuditAction,
    /// Evidence record affected
    pub evidence_id: Option<Uuid>,
    /// Result of the operation
    pub result: AuditResult,
    /// Refusal reason or additional context
    pub reason: Option<String>,
    /// Additional details as JSON (e.g. changed keys, link id)
    pub details: Option<serde_json::Value>,
}

impl AuditEvent {
    /// Create a new audit event builder
    pub fn builder(action: AuditAction) -> AuditEventBuilder {
        AuditEventBuilder::new(action)
    }

    pub fn get_actor_id(&self) -> Option<UserId> {
        self.actor_id.map(UserId)
    }

    pub fn get_evidence_id(&self) -> Option<EvidenceId> {
        self.evidence_id.map(EvidenceId)
    }
}

/// Builder for constructing audit events
pub struct AuditEventBuilder {
    action: AuditAction,
    timestamp: Option<DateTime<Utc>>,
    actor_id: Option<Uuid>,
    actor_email: Option<String>,
    evidence_id: Option<Uuid>,
    result: AuditResult,
    reason: Option<String>,
    details: Option<serde_json::Value>,
}

impl AuditEventBuilder {
    pub fn new(action: AuditAction) -> Self {
        Self {
            action,
            timestamp: None,
            actor_id: None,
            actor_email: None,
            evidence_id: None,
            result: AuditResult::Success,
            reason: None,
            details: None,
        }
    }

    /// Override the event time (defaults to `Utc::now()` at build).
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn actor(mut self, actor_id: Option<&UserId>) -> Self {
        self.actor_id = actor_id.map(|u| u.0);
        self
    }

    pub fn actor_email(mut self, email: impl Into<String>) -> Self {
        self.actor_email = Some(email.into());
        self
    }

    pub fn evidence(mut self, evidence_id: &EvidenceId) -> Self {
        self.evidence_id = Some(evidence_id.0);
        self
    }

    pub fn result(mut self, result: AuditResult) -> Self {
        self.result = result;
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn build(self) -> AuditEvent {
        AuditEvent {
            id: AuditLogId::new(),
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            actor_id: self.actor_id,
            actor_email: self.actor_email,
            action: self.action,
            evidence_id: self.evidence_id,
            result: self.result,
            reason: self.reason,
            details: self.details,
        }
    }
}

/// Filter for querying audit logs
#[derive(Clone, Debug, Default)]
pub struct AuditLogFilter {
    /// Filter by acting account
    pub actor_id: Option<UserId>,
    /// Filter by evidence record
    pub evidence_id: Option<EvidenceId>,
    /// Filter by action
    pub action: Option<AuditAction>,
    /// Filter by result
    pub result: Option<AuditResult>,
    /// Filter by start timestamp (inclusive)
    pub from: Option<DateTime<Utc>>,
    /// Filter by end timestamp (exclusive)
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of results to return
    pub limit: Option<u32>,
    /// Number of results to skip (for pagination)
    pub offset: Option<u32>,
}

impl AuditLogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actor_id(mut self, actor_id: UserId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn evidence_id(mut self, evidence_id: EvidenceId) -> Self {
        self.evidence_id = Some(evidence_id);
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn result(mut self, result: AuditResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Error type for audit log operations
#[derive(Debug, Error)]
pub enum AuditLogError {
    #[error("database error: {0}")]
    Database(String),

    #[error("audit log not found: {0}")]
    NotFound(AuditLogId),
}

/// Trait for audit log persistence.
///
/// Failures to record audit events are logged by callers and never fail
/// the workflow operation that produced them.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Record an audit event.
    async fn record(&self, event: AuditEvent) -> Result<(), AuditLogError>;

    /// Query audit logs with optional filters, newest first.
    async fn query(&self, filter: AuditLogFilter) -> Result<Vec<AuditEvent>, AuditLogError>;

    /// Get a specific audit log entry by ID.
    async fn get(&self, id: AuditLogId) -> Result<AuditEvent, AuditLogError>;

    /// Count audit logs matching the filter criteria.
    async fn count(&self, filter: AuditLogFilter) -> Result<u64, AuditLogError>;
}
