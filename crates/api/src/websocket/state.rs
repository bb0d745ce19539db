//! WebSocket state management
//!
//! Holds every live connection and the room registry. Built once at startup
//! and shared through `AppState`.

use std::collections::HashMap;
use std::sync::Arc;
use supportchat_shared::conversation::{user_room, ADMIN_ROOM};
use supportchat_shared::UserId;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::connection::{Connection, SessionError};
use super::room::RoomManager;

/// WebSocket state shared across all connections
#[derive(Clone)]
pub struct WebSocketState {
    /// All active connections indexed by session_id
    pub connections: Arc<RwLock<HashMap<Uuid, Arc<Connection>>>>,

    /// Room manager for identity and admin rooms
    pub rooms: Arc<RoomManager>,
}

impl WebSocketState {
    /// Create new WebSocket state
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            rooms: Arc::new(RoomManager::new()),
        }
    }

    /// Add a connection
    pub async fn add_connection(&self, conn: Connection) -> Arc<Connection> {
        let conn = Arc::new(conn);
        let mut connections = self.connections.write().await;
        connections.insert(conn.session_id, Arc::clone(&conn));

        tracing::info!(
            session_id = %conn.session_id,
            user_id = %conn.user_id,
            total_connections = connections.len(),
            "WebSocket connection added"
        );

        conn
    }

    /// Remove a connection and drop it from every room
    pub async fn remove_connection(&self, session_id: &Uuid) {
        let mut connections = self.connections.write().await;
        if let Some(conn) = connections.remove(session_id) {
            self.rooms.remove_connection(session_id).await;

            tracing::info!(
                session_id = %session_id,
                user_id = %conn.user_id,
                remaining_connections = connections.len(),
                "WebSocket connection removed"
            );
        }
    }

    /// Handle a `join` request from a live connection. The identity must be
    /// the token's own; the admin room is entered only by admin tokens that
    /// ask for it.
    pub async fn join_as(
        &self,
        conn: &Arc<Connection>,
        user_id: UserId,
        wants_admin: bool,
    ) -> Result<Vec<String>, SessionError> {
        if user_id != conn.user_id {
            tracing::warn!(
                session_id = %conn.session_id,
                user_id = %conn.user_id,
                requested = %user_id,
                "Join rejected: identity does not match token"
            );
            return Err(SessionError::ForeignIdentity);
        }

        let as_admin = wants_admin && conn.role.is_admin();
        if wants_admin && !as_admin {
            tracing::warn!(user_id = %conn.user_id, "Non-admin asked for the admin room");
        }

        Ok(self.join(conn, as_admin).await)
    }

    /// Put a connection into its identity room, and the admin room when
    /// `as_admin` is set. Returns every room the connection is in afterwards.
    pub async fn join(&self, conn: &Arc<Connection>, as_admin: bool) -> Vec<String> {
        self.rooms.join(&user_room(conn.user_id), Arc::clone(conn)).await;
        if as_admin {
            self.rooms.join(ADMIN_ROOM, Arc::clone(conn)).await;
        }
        conn.rooms().await
    }

    /// Get total number of active connections
    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    /// Get statistics about the WebSocket state
    pub async fn get_stats(&self) -> WebSocketStats {
        WebSocketStats {
            active_connections: self.connection_count().await,
            active_rooms: self.rooms.get_room_count().await,
        }
    }
}

impl Default for WebSocketState {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about WebSocket connections
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketStats {
    /// Number of active connections
    pub active_connections: usize,
    /// Number of active rooms
    pub active_rooms: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::events::ServerEvent;
    use supportchat_shared::Role;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_add_and_remove_connection() {
        let state = WebSocketState::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let conn = Connection::new(UserId(42), Role::Client, tx);
        let session_id = conn.session_id;

        let added_conn = state.add_connection(conn).await;
        assert_eq!(state.connection_count().await, 1);
        assert_eq!(added_conn.user_id, UserId(42));

        state.remove_connection(&session_id).await;
        assert_eq!(state.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_admin_join_enters_both_rooms() {
        let state = WebSocketState::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = state
            .add_connection(Connection::new(UserId(1), Role::Admin, tx))
            .await;

        let rooms = state.join(&conn, true).await;
        assert_eq!(rooms, vec!["1".to_string(), "admin".to_string()]);

        // Rejoining changes nothing
        let rooms = state.join(&conn, true).await;
        assert_eq!(rooms.len(), 2);
        assert_eq!(state.rooms.broadcast("admin", ServerEvent::Pong).await, 1);

        state.remove_connection(&conn.session_id).await;
        let stats = state.get_stats().await;
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.active_rooms, 0);
    }

    async fn connect(state: &WebSocketState, user_id: i64, role: Role) -> Arc<Connection> {
        let (tx, _rx) = mpsc::unbounded_channel();
        state
            .add_connection(Connection::new(UserId(user_id), role, tx))
            .await
    }

    #[tokio::test]
    async fn test_join_as_another_user_is_rejected() {
        let state = WebSocketState::new();
        let conn = connect(&state, 42, Role::Client).await;

        let err = state.join_as(&conn, UserId(43), false).await.unwrap_err();
        assert_eq!(err, SessionError::ForeignIdentity);
        assert!(conn.rooms().await.is_empty());
        assert_eq!(state.rooms.get_room_count().await, 0);
    }

    #[tokio::test]
    async fn test_client_cannot_enter_admin_room() {
        let state = WebSocketState::new();
        let conn = connect(&state, 42, Role::Client).await;

        let rooms = state.join_as(&conn, UserId(42), true).await.unwrap();
        assert_eq!(rooms, vec!["42".to_string()]);
        assert_eq!(state.rooms.broadcast("admin", ServerEvent::Pong).await, 0);
    }

    #[tokio::test]
    async fn test_admin_join_honours_flag() {
        let state = WebSocketState::new();
        let with_flag = connect(&state, 1, Role::Admin).await;
        let without_flag = connect(&state, 2, Role::Admin).await;

        state.join_as(&with_flag, UserId(1), true).await.unwrap();
        let rooms = state.join_as(&without_flag, UserId(2), false).await.unwrap();

        assert_eq!(rooms, vec!["2".to_string()]);
        assert_eq!(state.rooms.broadcast("admin", ServerEvent::Pong).await, 1);
    }
}
