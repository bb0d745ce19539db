//! WebSocket connection management
//!
//! Represents an authenticated WebSocket connection and the rooms it joined.

use std::collections::BTreeSet;
use std::sync::Arc;
use supportchat_shared::{Role, UserId};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::events::ServerEvent;

/// Lifecycle of a live connection. Disconnected connections are dropped from
/// the state entirely, so they have no variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Authenticated, not yet in any room
    Connected,
    /// In at least one room
    Joined,
}

/// Requests a live connection is not allowed to make
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Cannot join as another user")]
    ForeignIdentity,
    #[error("Cannot type in another conversation")]
    ForeignConversation,
    #[error("Join before sending events")]
    NotJoined,
}

/// Represents an active WebSocket connection
#[derive(Debug)]
pub struct Connection {
    /// Unique session ID for this connection
    pub session_id: Uuid,

    /// Identity from the access token
    pub user_id: UserId,
    pub role: Role,

    /// Channel to send events to this connection
    pub sender: mpsc::UnboundedSender<ServerEvent>,

    /// Rooms this connection has joined
    rooms: Arc<RwLock<BTreeSet<String>>>,
}

impl Connection {
    /// Create a new connection
    pub fn new(user_id: UserId, role: Role, sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id,
            role,
            sender,
            rooms: Arc::new(RwLock::new(BTreeSet::new())),
        }
    }

    /// Send an event to this connection
    ///
    /// Returns Ok(()) if sent successfully, Err if connection is closed
    #[allow(clippy::result_large_err)] // Error type is from tokio mpsc, containing the failed event
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.sender.send(event)
    }

    /// Record a joined room; returns false if it was already joined
    pub(super) async fn mark_joined(&self, room: &str) -> bool {
        self.rooms.write().await.insert(room.to_string())
    }

    pub async fn rooms(&self) -> Vec<String> {
        self.rooms.read().await.iter().cloned().collect()
    }

    pub async fn phase(&self) -> ConnectionPhase {
        if self.rooms.read().await.is_empty() {
            ConnectionPhase::Connected
        } else {
            ConnectionPhase::Joined
        }
    }
}
