//! Web Push notifications
//!
//! Admin replies are pushed to every browser subscription of the client.
//! Dispatch is best-effort: each endpoint is tried independently and failures
//! are only logged by the caller.

use async_trait::async_trait;
use serde::Serialize;
use supportchat_shared::PushSubscription;
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushError, WebPushMessageBuilder, URL_SAFE_NO_PAD,
};

use crate::config::Config;

/// Characters of the message shown in the notification body
const PUSH_PREVIEW_CHARS: usize = 50;

/// Seconds a push service keeps an undelivered notification
const PUSH_TTL_SECS: u32 = 24 * 60 * 60;

const PUSH_TITLE: &str = "New message from support";

/// JSON payload read by the service worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    pub url: String,
    pub icon: String,
}

impl PushPayload {
    /// Notification for a support reply, linking back to the conversation
    pub fn support_reply(content: &str, chat_url: String, icon: String) -> Self {
        let mut body: String = content.chars().take(PUSH_PREVIEW_CHARS).collect();
        if content.chars().count() > PUSH_PREVIEW_CHARS {
            body.push_str("...");
        }

        Self {
            title: PUSH_TITLE.to_string(),
            body,
            url: chat_url,
            icon,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("Push subscription is no longer valid")]
    Gone,
    #[error("Invalid VAPID configuration: {0}")]
    Vapid(String),
    #[error("Failed to encode payload: {0}")]
    Payload(String),
    #[error("Push delivery failed: {0}")]
    Delivery(String),
}

impl From<WebPushError> for PushError {
    fn from(err: WebPushError) -> Self {
        match err {
            WebPushError::EndpointNotValid { .. } | WebPushError::EndpointNotFound { .. } => {
                PushError::Gone
            }
            other => PushError::Delivery(other.to_string()),
        }
    }
}

/// Push notification boundary
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, subscription: &PushSubscription, payload: &PushPayload)
        -> Result<(), PushError>;
}

struct VapidKeys {
    private_key: String,
    subject: String,
}

/// Web Push sender signing with VAPID (no-op without keys)
pub struct WebPushSender {
    vapid: Option<VapidKeys>,
    client: Option<IsahcWebPushClient>,
}

impl WebPushSender {
    pub fn new(private_key: Option<String>, subject: String) -> Result<Self, PushError> {
        let Some(private_key) = private_key else {
            tracing::warn!("VAPID keys not configured; push notifications are disabled");
            return Ok(Self {
                vapid: None,
                client: None,
            });
        };

        let client = IsahcWebPushClient::new().map_err(|e| PushError::Delivery(e.to_string()))?;

        Ok(Self {
            vapid: Some(VapidKeys {
                private_key,
                subject,
            }),
            client: Some(client),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, PushError> {
        // Without the public half browsers cannot subscribe, so treat it as disabled
        let private_key = config
            .vapid_public_key
            .as_ref()
            .and(config.vapid_private_key.clone());

        Self::new(private_key, config.vapid_subject.clone())
    }

    pub fn is_enabled(&self) -> bool {
        self.vapid.is_some()
    }
}

#[async_trait]
impl PushSender for WebPushSender {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<(), PushError> {
        let (Some(vapid), Some(client)) = (&self.vapid, &self.client) else {
            tracing::debug!(endpoint = %subscription.endpoint, "Push disabled; skipping notification");
            return Ok(());
        };

        let info = SubscriptionInfo::new(
            subscription.endpoint.clone(),
            subscription.keys.p256dh.clone(),
            subscription.keys.auth.clone(),
        );

        let mut signature =
            VapidSignatureBuilder::from_base64(&vapid.private_key, URL_SAFE_NO_PAD, &info)
                .map_err(|e| PushError::Vapid(e.to_string()))?;
        signature.add_claim("sub", vapid.subject.as_str());
        let signature = signature
            .build()
            .map_err(|e| PushError::Vapid(e.to_string()))?;

        let body = serde_json::to_vec(payload).map_err(|e| PushError::Payload(e.to_string()))?;

        let mut builder = WebPushMessageBuilder::new(&info);
        builder.set_payload(ContentEncoding::Aes128Gcm, &body);
        builder.set_vapid_signature(signature);
        builder.set_ttl(PUSH_TTL_SECS);
        let message = builder
            .build()
            .map_err(|e| PushError::Payload(e.to_string()))?;

        client.send(message).await?;

        tracing::debug!(client_id = %subscription.client_id, "Push notification sent");
        Ok(())
    }
}
