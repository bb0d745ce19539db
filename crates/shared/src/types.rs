//! Common types used across SupportChat

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// =============================================================================
// ID Wrappers
// =============================================================================

/// User ID wrapper
///
/// Clients and admins share one numeric id space; a client's id is also the
/// key of its conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Message ID wrapper (monotonic)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct MessageId(pub i64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Role of an authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Client,
    Admin,
}

impl Role {
    /// Parse a role claim. Anything that is not an admin is treated as a client.
    pub fn from_claim(role: &str) -> Self {
        if role.eq_ignore_ascii_case("admin") {
            Self::Admin
        } else {
            Self::Client
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// Which side of the conversation wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SenderType {
    #[serde(alias = "CLIENTE", alias = "client")]
    Client,
    #[serde(alias = "admin")]
    Admin,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "CLIENT",
            Self::Admin => "ADMIN",
        }
    }

    /// The other party of the conversation
    pub fn opposite(&self) -> Self {
        match self {
            Self::Client => Self::Admin,
            Self::Admin => Self::Client,
        }
    }
}

impl From<Role> for SenderType {
    fn from(role: Role) -> Self {
        match role {
            Role::Client => Self::Client,
            Role::Admin => Self::Admin,
        }
    }
}

/// Message payload kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    #[default]
    #[serde(alias = "text")]
    Text,
    /// Content is the URI of an already-uploaded image
    #[serde(alias = "image")]
    Image,
}

/// Delete scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteMode {
    /// Hard delete for every participant (author only)
    #[serde(rename = "ALL", alias = "TODOS")]
    All,
    /// Hide the message for the requester only
    #[serde(rename = "SELF", alias = "MIM")]
    SelfOnly,
}

// =============================================================================
// Identity
// =============================================================================

/// The caller an operation is performed on behalf of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub user_id: UserId,
    pub role: Role,
}

impl Requester {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn client(user_id: i64) -> Self {
        Self::new(UserId(user_id), Role::Client)
    }

    pub fn admin(user_id: i64) -> Self {
        Self::new(UserId(user_id), Role::Admin)
    }
}

/// Best-effort identity fields used when a client row has to be created
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorProfile {
    pub name: Option<String>,
    pub email: Option<String>,
}

// =============================================================================
// Messages
// =============================================================================

/// A persisted chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub kind: MessageKind,
    pub sender_type: SenderType,
    pub client_id: UserId,
    pub author_user_id: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
    pub deleted_by: Vec<UserId>,
}

impl Message {
    /// Admins take part in every conversation; clients only in their own.
    pub fn is_participant(&self, requester: &Requester) -> bool {
        requester.role.is_admin()
            || self.client_id == requester.user_id
            || self.author_user_id == requester.user_id
    }

    /// A participant may mark a message read unless they wrote it
    pub fn is_readable_by(&self, reader: &Requester) -> bool {
        self.author_user_id != reader.user_id && self.is_participant(reader)
    }

    pub fn is_hidden_for(&self, user_id: UserId) -> bool {
        self.deleted_by.contains(&user_id)
    }
}

/// Input for creating a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub content: String,
    pub kind: MessageKind,
    pub sender_type: SenderType,
    pub author_user_id: UserId,
    pub client_id: UserId,
}

/// A row flipped from unread to read by a mark-read call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadUpdate {
    pub id: MessageId,
    pub author_user_id: UserId,
    pub client_id: UserId,
}

/// Unread counters for a caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadSummary {
    pub unread_count: i64,
    pub unread_by_client: Vec<ClientUnread>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientUnread {
    pub client_id: UserId,
    pub count: i64,
}

// =============================================================================
// Clients & push subscriptions
// =============================================================================

/// Placeholder name for clients created without a profile
pub const DEFAULT_CLIENT_NAME: &str = "New client";

/// A client record (one per conversation)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: UserId,
    pub name: String,
    pub email: Option<String>,
    pub owner_user_id: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Client {
    /// Fill the placeholder name and a missing email from the client's own
    /// profile. Known values are never overwritten. Returns whether anything
    /// changed.
    pub fn complete_from(&mut self, name: &str, email: Option<&str>) -> bool {
        let mut changed = false;
        if self.name == DEFAULT_CLIENT_NAME && name != DEFAULT_CLIENT_NAME {
            self.name = name.to_string();
            changed = true;
        }
        if self.email.is_none() {
            if let Some(email) = email {
                self.email = Some(email.to_string());
                changed = true;
            }
        }
        changed
    }
}

/// Web Push encryption keys, as handed out by the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

/// A registered Web Push endpoint for a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub id: i64,
    pub endpoint: String,
    pub keys: PushKeys,
    pub client_id: UserId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPushSubscription {
    pub endpoint: String,
    pub keys: PushKeys,
    pub client_id: UserId,
}
