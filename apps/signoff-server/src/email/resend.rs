//! Resend email provider implementation.

use super::{EmailError, EmailProvider, MagicLinkEmailContent};
use async_trait::async_trait;
use resend_rs::{types::CreateEmailBaseOptions, Resend};

/// Resend email provider.
pub struct ResendProvider {
    client: Resend,
}

impl ResendProvider {
    /// Create a new Resend provider with the given API key.
    pub fn new(api_key: String) -> Self {
        Self {
            client: Resend::new(&api_key),
        }
    }
}

#[async_trait]
impl EmailProvider for ResendProvider {
    async fn send(
        &self,
        to: &str,
        from: &str,
        content: &MagicLinkEmailContent,
    ) -> Result<(), EmailError> {
        let email = CreateEmailBaseOptions::new(from, vec![to.to_string()], &content.subject)
            .with_text(&content.text)
            .with_html(&content.html);

        self.client
            .emails
            .send(email)
            .await
            .map_err(|e| EmailError::SendFailed(e.to_string()))?;

        Ok(())
    }
}
