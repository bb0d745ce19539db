//! WebSocket event types and serialization
//!
//! Frames are JSON objects of the form `{"event": "<name>", "data": {...}}`.

use serde::{Deserialize, Deserializer, Serialize};
use supportchat_shared::{Message, MessageId, SenderType, UserId};
use uuid::Uuid;

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Enter the identity room (and the admin room for admins)
    Join(JoinPayload),

    /// Typing indicator, relayed to the other party
    Typing(TypingPayload),

    /// Heartbeat ping to keep connection alive
    Ping,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    #[serde(deserialize_with = "numeric_id")]
    pub user_id: UserId,
    #[serde(default)]
    pub is_admin: bool,
}

/// Typing signal; also the payload of `displayTyping`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    #[serde(alias = "clienteId", alias = "usuarioId", deserialize_with = "numeric_id")]
    pub client_id: UserId,
    pub sender_type: SenderType,
    pub is_typing: bool,
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// A message was created in a conversation the connection follows
    NewMessage(Message),

    /// Messages authored by the receiver were read
    MessageRead(ReadReceipt),

    /// A message was removed for everyone
    MessageDeleted(DeletedMessage),

    /// The other party is (or stopped) typing
    DisplayTyping(TypingPayload),

    /// Connection acknowledged
    Connected(ConnectedAck),

    /// Join acknowledged with the rooms the connection is now in
    Joined(JoinedAck),

    /// Heartbeat response
    Pong,

    /// Error message
    Error(ErrorPayload),
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Event name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewMessage(_) => "newMessage",
            Self::MessageRead(_) => "messageRead",
            Self::MessageDeleted(_) => "messageDeleted",
            Self::DisplayTyping(_) => "displayTyping",
            Self::Connected(_) => "connected",
            Self::Joined(_) => "joined",
            Self::Pong => "pong",
            Self::Error(_) => "error",
        }
    }
}

// =============================================================================
// Event Data Structures
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub message_ids: Vec<MessageId>,
    pub read_by: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedMessage {
    pub id: MessageId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedAck {
    pub session_id: Uuid,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinedAck {
    pub rooms: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Browsers send ids either as numbers or as numeric strings
fn numeric_id<'de, D>(deserializer: D) -> Result<UserId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(UserId(id)),
        RawId::Text(text) => text
            .trim()
            .parse()
            .map(UserId)
            .map_err(|_| serde::de::Error::custom(format!("invalid id: {:?}", text))),
    }
}
