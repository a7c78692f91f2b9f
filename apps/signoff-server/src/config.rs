//! Server configuration.
//!
//! Supports configuration via environment variables:
//!
//! ```bash
//! # Links
//! SIGNOFF_PUBLIC_URL=https://portfolio.example.org   # base of the link the supervisor opens
//! SIGNOFF_LINK_TTL_HOURS=24
//! SIGNOFF_SESSION_TTL_HOURS=12
//!
//! # Provider: Resend
//! SIGNOFF_EMAIL_PROVIDER=resend
//! RESEND_API_KEY=re_...
//!
//! # Provider: SMTP
//! SIGNOFF_EMAIL_PROVIDER=smtp
//! SMTP_HOST=smtp.nhs.net
//! SMTP_PORT=587
//! SMTP_USERNAME=user@example.com
//! SMTP_PASSWORD=app_password
//! SMTP_USE_TLS=true
//!
//! # Sender config
//! SIGNOFF_EMAIL_FROM=noreply@portfolio.example.org
//! SIGNOFF_EMAIL_FROM_NAME="Portfolio Sign-off"
//! ```

use std::env;

use chrono::Duration;
use signoff_workflow::WorkflowSettings;
use thiserror::Error;

const DEFAULT_PUBLIC_URL: &str = "http://localhost:3000";

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Base URL magic links point at. Always absolute http(s), no trailing slash.
    pub public_url: String,
    pub link_ttl: Duration,
    pub session_ttl: Duration,
    /// Outbound email. Without it links are still issued, just not delivered.
    pub email: Option<EmailConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            public_url: DEFAULT_PUBLIC_URL.to_string(),
            link_ttl: Duration::hours(24),
            session_ttl: Duration::hours(12),
            email: None,
        }
    }
}

/// Email configuration for magic-link delivery
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// Email provider configuration
    pub provider: EmailProviderConfig,
    /// From email address
    pub from_address: String,
    /// Optional from name
    pub from_name: Option<String>,
}

/// Email provider configuration
#[derive(Debug, Clone)]
pub enum EmailProviderConfig {
    /// Resend email provider
    Resend {
        /// Resend API key
        #[allow(dead_code)] // Used when email-resend feature is enabled
        api_key: String,
    },
    /// SMTP email provider
    Smtp {
        host: String,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        use_tls: bool,
    },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid email provider: {0}. Expected 'resend' or 'smtp'")]
    InvalidProvider(String),

    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),

    #[error("Missing from address: SIGNOFF_EMAIL_FROM is required when email is configured")]
    MissingFromAddress,

    #[error("SMTP provider requires SMTP_HOST")]
    SmtpMissingHost,

    #[error("Invalid public URL {0}: must be an absolute http(s) URL")]
    InvalidPublicUrl(String),

    #[error("Invalid value for {name}: {value}. Expected a positive number of hours")]
    InvalidHours { name: &'static str, value: String },
}

fn hours_var(name: &'static str, default: i64) -> Result<Duration, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(Duration::hours(default)),
        Ok(value) => match value.trim().parse::<i64>() {
            Ok(h) if h > 0 => Ok(Duration::hours(h)),
            _ => Err(ConfigError::InvalidHours { name, value }),
        },
    }
}

fn flag_var(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|v| v.to_lowercase() == "true" || v == "1")
        .unwrap_or(default)
}

fn parse_public_url(raw: &str) -> Result<String, ConfigError> {
    let parsed =
        url::Url::parse(raw).map_err(|_| ConfigError::InvalidPublicUrl(raw.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ConfigError::InvalidPublicUrl(raw.to_string()));
    }
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let public_url = parse_public_url(
            &env::var("SIGNOFF_PUBLIC_URL").unwrap_or_else(|_| DEFAULT_PUBLIC_URL.to_string()),
        )?;
        let link_ttl = hours_var("SIGNOFF_LINK_TTL_HOURS", 24)?;
        let session_ttl = hours_var("SIGNOFF_SESSION_TTL_HOURS", 12)?;

        let Ok(provider_type) = env::var("SIGNOFF_EMAIL_PROVIDER") else {
            return Ok(Self {
                public_url,
                link_ttl,
                session_ttl,
                email: None,
            });
        };

        let provider = match provider_type.to_lowercase().as_str() {
            "resend" => {
                let api_key = env::var("RESEND_API_KEY")
                    .map_err(|_| ConfigError::MissingEnvVar("RESEND_API_KEY".to_string()))?;
                EmailProviderConfig::Resend { api_key }
            }
            "smtp" => {
                let host = env::var("SMTP_HOST").map_err(|_| ConfigError::SmtpMissingHost)?;
                let port = match env::var("SMTP_PORT") {
                    Err(_) => 587,
                    Ok(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidPort(raw))?,
                };
                EmailProviderConfig::Smtp {
                    host,
                    port,
                    username: env::var("SMTP_USERNAME").ok(),
                    password: env::var("SMTP_PASSWORD").ok(),
                    use_tls: flag_var("SMTP_USE_TLS", true), // TLS by default
                }
            }
            other => return Err(ConfigError::InvalidProvider(other.to_string())),
        };

        let from_address =
            env::var("SIGNOFF_EMAIL_FROM").map_err(|_| ConfigError::MissingFromAddress)?;
        let from_name = env::var("SIGNOFF_EMAIL_FROM_NAME").ok();

        Ok(Self {
            public_url,
            link_ttl,
            session_ttl,
            email: Some(EmailConfig {
                provider,
                from_address,
                from_name,
            }),
        })
    }

    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            link_ttl: self.link_ttl,
            public_url: self.public_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_VARS: &[&str] = &[
        "SIGNOFF_PUBLIC_URL",
        "SIGNOFF_LINK_TTL_HOURS",
        "SIGNOFF_SESSION_TTL_HOURS",
        "SIGNOFF_EMAIL_PROVIDER",
        "RESEND_API_KEY",
        "SMTP_HOST",
        "SMTP_PORT",
        "SMTP_USERNAME",
        "SMTP_PASSWORD",
        "SMTP_USE_TLS",
        "SIGNOFF_EMAIL_FROM",
        "SIGNOFF_EMAIL_FROM_NAME",
    ];

    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
    }

    impl<'a> EnvGuard<'a> {
        fn new() -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            for var in ENV_VARS {
                env::remove_var(var);
            }
            Self { _lock: lock }
        }

        fn set(&self, key: &str, value: &str) {
            env::set_var(key, value);
        }
    }

    impl<'a> Drop for EnvGuard<'a> {
        fn drop(&mut self) {
            for var in ENV_VARS {
                env::remove_var(var);
            }
        }
    }

    #[test]
    fn test_defaults_without_email() {
        let _guard = EnvGuard::new();

        let config = ServerConfig::from_env().unwrap();
        assert!(config.email.is_none());
        assert_eq!(config.public_url, "http://localhost:3000");
        assert_eq!(config.link_ttl, Duration::hours(24));
        assert_eq!(config.session_ttl, Duration::hours(12));
    }

    #[test]
    fn test_public_url_trailing_slash_is_trimmed() {
        let guard = EnvGuard::new();
        guard.set("SIGNOFF_PUBLIC_URL", "https://portfolio.example.org/");

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.public_url, "https://portfolio.example.org");
        assert_eq!(
            config.workflow_settings().public_url,
            "https://portfolio.example.org"
        );
    }

    #[test]
    fn test_public_url_must_be_http() {
        let guard = EnvGuard::new();
        guard.set("SIGNOFF_PUBLIC_URL", "ftp://portfolio.example.org");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::InvalidPublicUrl(_))
        ));

        guard.set("SIGNOFF_PUBLIC_URL", "portfolio.example.org");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::InvalidPublicUrl(_))
        ));
    }

    #[test]
    fn test_ttl_hours() {
        let guard = EnvGuard::new();
        guard.set("SIGNOFF_LINK_TTL_HOURS", "72");
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.link_ttl, Duration::hours(72));

        guard.set("SIGNOFF_LINK_TTL_HOURS", "0");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::InvalidHours {
                name: "SIGNOFF_LINK_TTL_HOURS",
                ..
            })
        ));
    }

    #[test]
    fn test_resend_requires_api_key() {
        let guard = EnvGuard::new();
        guard.set("SIGNOFF_EMAIL_PROVIDER", "resend");
        guard.set("SIGNOFF_EMAIL_FROM", "noreply@example.org");

        let result = ServerConfig::from_env();
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(ref v)) if v == "RESEND_API_KEY"));

        guard.set("RESEND_API_KEY", "re_test");
        let config = ServerConfig::from_env().unwrap();
        let email = config.email.unwrap();
        assert!(matches!(email.provider, EmailProviderConfig::Resend { .. }));
        assert_eq!(email.from_address, "noreply@example.org");
    }

    #[test]
    fn test_smtp_config() {
        let guard = EnvGuard::new();
        guard.set("SIGNOFF_EMAIL_PROVIDER", "SMTP");
        guard.set("SMTP_HOST", "smtp.example.org");
        guard.set("SMTP_PORT", "465");
        guard.set("SMTP_USE_TLS", "false");
        guard.set("SIGNOFF_EMAIL_FROM", "noreply@example.org");
        guard.set("SIGNOFF_EMAIL_FROM_NAME", "Portfolio");

        let config = ServerConfig::from_env().unwrap();
        let email = config.email.unwrap();
        assert_eq!(email.from_name.as_deref(), Some("Portfolio"));
        match email.provider {
            EmailProviderConfig::Smtp {
                host,
                port,
                use_tls,
                username,
                ..
            } => {
                assert_eq!(host, "smtp.example.org");
                assert_eq!(port, 465);
                assert!(!use_tls);
                assert!(username.is_none());
            }
            other => panic!("expected smtp, got {:?}", other),
        }
    }

    #[test]
    fn test_smtp_errors() {
        let guard = EnvGuard::new();
        guard.set("SIGNOFF_EMAIL_PROVIDER", "smtp");
        guard.set("SIGNOFF_EMAIL_FROM", "noreply@example.org");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::SmtpMissingHost)
        ));

        guard.set("SMTP_HOST", "smtp.example.org");
        guard.set("SMTP_PORT", "not-a-port");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::InvalidPort(ref p)) if p == "not-a-port"
        ));
    }

    #[test]
    fn test_missing_from_and_unknown_provider() {
        let guard = EnvGuard::new();
        guard.set("SIGNOFF_EMAIL_PROVIDER", "resend");
        guard.set("RESEND_API_KEY", "re_test");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::MissingFromAddress)
        ));

        guard.set("SIGNOFF_EMAIL_PROVIDER", "carrier-pigeon");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::InvalidProvider(ref p)) if p == "carrier-pigeon"
        ));
    }
}
