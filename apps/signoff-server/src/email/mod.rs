//! Email module for magic-link delivery.

#[cfg(feature = "email-resend")]
mod resend;
#[cfg(feature = "email-smtp")]
mod smtp;
mod templates;

pub use templates::MagicLinkEmailContent;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::config::{EmailConfig, EmailProviderConfig};

/// Attempts per message before delivery is reported as failed.
const SEND_ATTEMPTS: u32 = 2;
const RETRY_DELAY: Duration = Duration::from_millis(250);

/// Email sending error
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Failed to send email: {0}")]
    SendFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Provider not available: {0}")]
    ProviderNotAvailable(String),
}

impl EmailError {
    /// Configuration problems will not fix themselves on a second attempt.
    fn is_retryable(&self) -> bool {
        matches!(self, EmailError::SendFailed(_))
    }
}

/// Trait for email providers
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Send one message. `from` is already formatted as `Name <address>` when a name is set.
    async fn send(
        &self,
        to: &str,
        from: &str,
        content: &MagicLinkEmailContent,
    ) -> Result<(), EmailError>;
}

/// Create an email provider from configuration
pub fn create_provider(config: &EmailConfig) -> Result<Box<dyn EmailProvider>, EmailError> {
    match &config.provider {
        #[cfg(feature = "email-resend")]
        EmailProviderConfig::Resend { api_key } => {
            Ok(Box::new(resend::ResendProvider::new(api_key.clone())))
        }
        #[cfg(not(feature = "email-resend"))]
        EmailProviderConfig::Resend { .. } => Err(EmailError::ProviderNotAvailable(
            "Resend support not compiled in. Enable the 'email-resend' feature.".to_string(),
        )),
        #[cfg(feature = "email-smtp")]
        EmailProviderConfig::Smtp {
            host,
            port,
            username,
            password,
            use_tls,
        } => {
            let provider = smtp::SmtpProvider::new(
                host.clone(),
                *port,
                username.clone(),
                password.clone(),
                *use_tls,
            )?;
            Ok(Box::new(provider))
        }
        #[cfg(not(feature = "email-smtp"))]
        EmailProviderConfig::Smtp { .. } => Err(EmailError::ProviderNotAvailable(
            "SMTP support not compiled in. Enable the 'email-smtp' feature.".to_string(),
        )),
    }
}

/// A provider plus sender identity, with bounded retry on send failures.
pub struct Mailer {
    provider: Box<dyn EmailProvider>,
    from: String,
}

impl Mailer {
    pub fn new(provider: Box<dyn EmailProvider>, from_address: &str, from_name: Option<&str>) -> Self {
        let from = match from_name {
            Some(name) => format!("{} <{}>", name, from_address),
            None => from_address.to_string(),
        };
        Self { provider, from }
    }

    pub fn from_config(config: &EmailConfig) -> Result<Self, EmailError> {
        Ok(Self::new(
            create_provider(config)?,
            &config.from_address,
            config.from_name.as_deref(),
        ))
    }

    pub async fn send_magic_link(
        &self,
        to: &str,
        content: &MagicLinkEmailContent,
    ) -> Result<(), EmailError> {
        let mut attempt = 1;
        loop {
            match self.provider.send(to, &self.from, content).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < SEND_ATTEMPTS => {
                    warn!(attempt, error = %e, "magic link email failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use signoff_storage::EvidenceKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct Flaky {
        failures: u32,
        calls: Arc<AtomicU32>,
        error: fn() -> EmailError,
    }

    #[async_trait]
    impl EmailProvider for Flaky {
        async fn send(
            &self,
            _to: &str,
            from: &str,
            _content: &MagicLinkEmailContent,
        ) -> Result<(), EmailError> {
            assert_eq!(from, "Portfolio <noreply@example.org>");
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err((self.error)())
            } else {
                Ok(())
            }
        }
    }

    fn content() -> MagicLinkEmailContent {
        MagicLinkEmailContent::new(EvidenceKind::Cbd, "Tess", "http://x/magic-link?token=t", Utc::now())
    }

    fn mailer(failures: u32, error: fn() -> EmailError) -> (Mailer, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let provider = Flaky {
            failures,
            calls: calls.clone(),
            error,
        };
        (
            Mailer::new(Box::new(provider), "noreply@example.org", Some("Portfolio")),
            calls,
        )
    }

    #[tokio::test]
    async fn test_send_retries_once() {
        let (m, calls) = mailer(1, || EmailError::SendFailed("timeout".into()));
        m.send_magic_link("sup@example.org", &content()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_send_gives_up_after_two_attempts() {
        let (m, calls) = mailer(5, || EmailError::SendFailed("timeout".into()));
        assert!(m.send_magic_link("sup@example.org", &content()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_config_errors_are_not_retried() {
        let (m, calls) = mailer(5, || EmailError::InvalidConfig("bad address".into()));
        assert!(m.send_magic_link("sup@example.org", &content()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
