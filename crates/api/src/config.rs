//! Application configuration

use std::env;
use std::time::Duration;

/// Default delay before an unread admin reply triggers a fallback email
pub const DEFAULT_EMAIL_FOLLOWUP_DELAY_SECS: u64 = 600;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    /// Base URL used for deep links in push notifications and emails
    pub public_url: String,

    // Database (in-memory store when unset)
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Authentication
    pub jwt_secret: String,

    // Email (SMTP)
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub mail_from: String,

    // Web Push (VAPID)
    pub vapid_public_key: Option<String>,
    pub vapid_private_key: Option<String>,
    pub vapid_subject: String,

    // Offline follow-up
    pub email_followup_delay: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string())
                .trim_end_matches('/')
                .to_string(),

            // Database
            database_url: non_empty("DATABASE_URL"),
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),

            // Authentication
            jwt_secret: {
                let secret =
                    env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
                if secret.len() < 32 {
                    return Err(ConfigError::WeakSecret(
                        "JWT_SECRET must be at least 32 characters",
                    ));
                }
                secret
            },

            // Email
            smtp_host: env::var("SMTP_HOST").unwrap_or_default().trim().to_string(),
            smtp_port: match env::var("SMTP_PORT") {
                Ok(port) => port
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::Invalid("SMTP_PORT must be a port number"))?,
                Err(_) => 587,
            },
            smtp_username: non_empty("SMTP_USERNAME"),
            smtp_password: non_empty("SMTP_PASSWORD"),
            mail_from: env::var("MAIL_FROM")
                .unwrap_or_else(|_| "SupportChat <no-reply@localhost>".to_string()),

            // Web Push
            vapid_public_key: non_empty("VAPID_PUBLIC_KEY"),
            vapid_private_key: non_empty("VAPID_PRIVATE_KEY"),
            vapid_subject: env::var("VAPID_SUBJECT")
                .unwrap_or_else(|_| "mailto:support@localhost".to_string()),

            // Offline follow-up
            email_followup_delay: Duration::from_secs(
                env::var("EMAIL_FOLLOWUP_DELAY_SECS")
                    .ok()
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(DEFAULT_EMAIL_FOLLOWUP_DELAY_SECS),
            ),
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}
