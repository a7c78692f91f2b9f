use chrono::Duration;
use signoff_audit::AuditLog;
use signoff_storage::{CreateSessionParams, Session, Store, StoreError, User, UserId};
use tracing::debug;

use crate::token::{generate_token, hash_token};
use crate::{Workflow, WorkflowError};

impl<S: Store + AuditLog> Workflow<S> {
    /// Open a login session. Returns the bearer value once; only its hash is stored.
    pub async fn create_session(
        &self,
        user_id: &UserId,
        ttl: Duration,
    ) -> Result<(String, Session), WorkflowError> {
        let user = self.store().get_user_by_id(user_id).await?;
        let token = generate_token();
        let session = self
            .store()
            .create_session(&CreateSessionParams {
                token_hash: hash_token(&token),
                user_id: user.id,
                expires_at: self.now() + ttl,
            })
            .await?;
        debug!(user_id = %user.id, expires_at = %session.expires_at, "session created");
        Ok((token, session))
    }

    /// Resolve a session bearer to its account. Unknown or expired sessions are unauthorized.
    pub async fn authenticate(&self, bearer: &str) -> Result<User, WorkflowError> {
        let session = match self.store().get_session(&hash_token(bearer)).await {
            Ok(session) => session,
            Err(StoreError::NotFound) => return Err(WorkflowError::Unauthorized),
            Err(e) => return Err(e.into()),
        };
        if self.now() >= session.expires_at {
            return Err(WorkflowError::Unauthorized);
        }
        match self.store().get_user_by_id(&session.user_id).await {
            Ok(user) => Ok(user),
            Err(StoreError::NotFound) => Err(WorkflowError::Unauthorized),
            Err(e) => Err(e.into()),
        }
    }
}
