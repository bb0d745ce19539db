//! Email notifications
//!
//! Offline fallback for admin replies: when a client has not read a reply after
//! the follow-up delay, one email with a preview and a deep link is sent.

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;

use crate::config::Config;

/// Characters of the message quoted in the follow-up email
const EMAIL_PREVIEW_CHARS: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Invalid address: {0}")]
    Address(String),
    #[error("Failed to configure SMTP transport: {0}")]
    Transport(String),
    #[error("Failed to build email: {0}")]
    Build(String),
    #[error("Failed to send email: {0}")]
    Send(String),
}

/// Outgoing mail boundary
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), MailError>;
}

/// SMTP mailer (no-op when no host is configured)
#[derive(Clone)]
pub struct SmtpMailer {
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(
        host: &str,
        port: u16,
        credentials: Option<(String, String)>,
        from: &str,
    ) -> Result<Self, MailError> {
        let from = from
            .parse::<Mailbox>()
            .map_err(|e| MailError::Address(format!("MAIL_FROM: {}", e)))?;

        let transport = if host.trim().is_empty() {
            tracing::warn!("SMTP host not configured; follow-up emails will only be logged");
            None
        } else {
            // 465 is implicit TLS, everything else upgrades with STARTTLS
            let builder = if port == 465 {
                AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            }
            .map_err(|e| MailError::Transport(e.to_string()))?
            .port(port);

            let builder = match credentials {
                Some((username, password)) => {
                    builder.credentials(Credentials::new(username, password))
                }
                None => builder,
            };

            tracing::info!(host = %host, port, "SMTP transport configured");
            Some(Arc::new(builder.build()))
        };

        Ok(Self { transport, from })
    }

    pub fn from_config(config: &Config) -> Result<Self, MailError> {
        let credentials = config
            .smtp_username
            .clone()
            .zip(config.smtp_password.clone());

        Self::new(&config.smtp_host, config.smtp_port, credentials, &config.mail_from)
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), MailError> {
        let Some(transport) = &self.transport else {
            tracing::info!(to = %to, subject = %subject, "Mailer in no-op mode; skipping send");
            return Ok(());
        };

        let recipient = to
            .parse::<Mailbox>()
            .map_err(|e| MailError::Address(e.to_string()))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(recipient)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())
            .map_err(|e| MailError::Build(e.to_string()))?;

        transport
            .send(email)
            .await
            .map_err(|e| MailError::Send(e.to_string()))?;

        tracing::info!(to = %to, subject = %subject, "Email sent");
        Ok(())
    }
}

/// Follow-up email for an unread admin reply. Returns `(subject, html)`.
pub fn unread_reply_email(client_name: &str, content: &str, chat_link: &str) -> (String, String) {
    let mut preview: String = content.chars().take(EMAIL_PREVIEW_CHARS).collect();
    if content.chars().count() > EMAIL_PREVIEW_CHARS {
        preview.push_str("...");
    }

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2>Hi, {name}!</h2>
    <p>You have a new message from support that has not been read yet.</p>
    <div style="background-color: #ecfdf5; border-left: 4px solid #10b981; padding: 16px; margin: 20px 0;">
        <p style="margin: 0;"><strong>Message:</strong> "{preview}"</p>
    </div>
    <p>
        <a href="{link}" style="display: inline-block; padding: 10px 20px; background-color: #10b981; color: white; text-decoration: none; border-radius: 5px;">
            Reply now
        </a>
    </p>
    <p style="color: #888; font-size: 12px;">If you have already read this message, please ignore this email.</p>
</body>
</html>"#,
        name = escape_html(client_name),
        preview = escape_html(&preview),
        link = chat_link,
    );

    ("New message from support".to_string(), html)
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
