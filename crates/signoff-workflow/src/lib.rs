//! Evidence sign-off workflow.
//!
//! [`Workflow`] ties the state machine to a backend implementing both
//! [`Store`](signoff_storage::Store) and [`AuditLog`](signoff_audit::AuditLog):
//!
//! - [`Workflow::issue_link`] hands a supervisor a magic link (and submits a draft),
//! - [`Workflow::validate_link`] is the read-only check behind the recipient's page load,
//! - [`Workflow::submit_with_token`] is the only write path for link holders,
//! - the `evidence` module holds the authenticated in-app operations.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use signoff_audit::{AuditEvent, AuditLog};
use signoff_storage::Store;
use tracing::warn;

pub mod clock;
mod error;
mod evidence;
mod gateway;
mod issuer;
pub mod machine;
mod sessions;
pub mod token;
mod validator;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{TokenRefusal, WorkflowError};
pub use gateway::{SubmitOutcome, SubmitRequest};
pub use issuer::{IssueRequest, IssuedLink};
pub use validator::{check_link, ScopedView, ValidationResult};

/// Optimistic-concurrency attempts before a write gives up as transient.
pub const MAX_WRITE_ATTEMPTS: usize = 3;

#[derive(Clone, Debug)]
pub struct WorkflowSettings {
    /// Absolute lifetime of a magic link.
    pub link_ttl: Duration,
    /// Base URL the recipient opens, e.g. `https://portfolio.example.org`.
    pub public_url: String,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            link_ttl: Duration::hours(24),
            public_url: "http://localhost:3000".to_string(),
        }
    }
}

pub struct Workflow<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    settings: WorkflowSettings,
}

impl<S> Clone for Workflow<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl<S: Store + AuditLog> Workflow<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, settings: WorkflowSettings) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Record an audit event. Failures are logged and swallowed.
    async fn audit(&self, event: AuditEvent) {
        let action = event.action.clone();
        if let Err(e) = self.store.record(event).await {
            warn!(%action, error = %e, "failed to record audit event");
        }
    }
}
