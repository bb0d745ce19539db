//! Room management for pub/sub
//!
//! A room is a named group of live connections: one per identity (`"{id}"`)
//! plus the shared `"admin"` room. Rooms exist only while they have members.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::connection::Connection;
use super::events::ServerEvent;

/// Manages rooms for broadcasting events
pub struct RoomManager {
    /// Map of room name -> list of connections
    rooms: Arc<RwLock<HashMap<String, Vec<Arc<Connection>>>>>,
}

impl RoomManager {
    /// Create a new room manager
    pub fn new() -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a connection to a room. Joining a room twice is a no-op.
    pub async fn join(&self, room: &str, conn: Arc<Connection>) -> bool {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(room.to_string()).or_default();

        if members.iter().any(|c| c.session_id == conn.session_id) {
            return false;
        }
        members.push(Arc::clone(&conn));
        let room_size = members.len();
        drop(rooms);

        conn.mark_joined(room).await;
        tracing::debug!(
            room = %room,
            session_id = %conn.session_id,
            room_size,
            "Connection joined room"
        );
        true
    }

    /// Broadcast an event to all connections in a room
    ///
    /// Fire-and-forget: send errors are ignored (closed connections are cleaned
    /// up on disconnect) and nothing is kept when the room is empty.
    pub async fn broadcast(&self, room: &str, event: ServerEvent) -> usize {
        self.fan_out(&[room], event, None).await
    }

    /// Broadcast to the union of several rooms; a connection that is in more
    /// than one of them receives the event once
    pub async fn broadcast_to_rooms<S: AsRef<str>>(&self, rooms: &[S], event: ServerEvent) -> usize {
        let rooms: Vec<&str> = rooms.iter().map(AsRef::as_ref).collect();
        self.fan_out(&rooms, event, None).await
    }

    /// Broadcast to a room, skipping the originating connection
    pub async fn relay(&self, room: &str, event: ServerEvent, exclude: &Uuid) -> usize {
        self.fan_out(&[room], event, Some(exclude)).await
    }

    async fn fan_out(&self, targets: &[&str], event: ServerEvent, exclude: Option<&Uuid>) -> usize {
        let rooms = self.rooms.read().await;
        let mut delivered = HashSet::new();
        let mut failed_count = 0;

        for conn in targets
            .iter()
            .filter_map(|room| rooms.get(*room))
            .flatten()
        {
            if exclude == Some(&conn.session_id) || delivered.contains(&conn.session_id) {
                continue;
            }
            match conn.send(event.clone()) {
                Ok(()) => {
                    delivered.insert(conn.session_id);
                }
                Err(_) => {
                    failed_count += 1;
                    tracing::warn!(
                        session_id = %conn.session_id,
                        "Failed to send event to connection (likely closed)"
                    );
                }
            }
        }

        tracing::debug!(
            rooms = ?targets,
            event = event.name(),
            recipients = delivered.len(),
            failed = failed_count,
            "Broadcast event"
        );
        delivered.len()
    }

    /// Remove a connection from all rooms
    pub async fn remove_connection(&self, session_id: &Uuid) {
        let mut rooms = self.rooms.write().await;
        let mut removed_from = 0;

        for conns in rooms.values_mut() {
            let before_len = conns.len();
            conns.retain(|c| c.session_id != *session_id);
            if conns.len() < before_len {
                removed_from += 1;
            }
        }

        // Clean up empty rooms
        rooms.retain(|_, conns| !conns.is_empty());

        if removed_from > 0 {
            tracing::debug!(
                session_id = %session_id,
                room_count = removed_from,
                "Removed connection from rooms"
            );
        }
    }

    /// Get total number of active rooms
    pub async fn get_room_count(&self) -> usize {
        let rooms = self.rooms.read().await;
        rooms.len()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use supportchat_shared::{Role, UserId};
    use tokio::sync::mpsc;

    fn connection(user_id: i64) -> (Arc<Connection>, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Connection::new(UserId(user_id), Role::Client, tx)), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> usize {
        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    #[tokio::test]
    async fn test_room_join_is_idempotent() {
        let room_manager = RoomManager::new();
        let (conn, mut rx) = connection(42);

        // Rooms exist only while they have members
        assert_eq!(room_manager.get_room_count().await, 0);

        assert!(room_manager.join("42", Arc::clone(&conn)).await);
        assert!(!room_manager.join("42", Arc::clone(&conn)).await);
        assert_eq!(room_manager.get_room_count().await, 1);
        assert_eq!(room_manager.broadcast("42", ServerEvent::Pong).await, 1);
        assert_eq!(drain(&mut rx), 1);

        room_manager.remove_connection(&conn.session_id).await;
        assert_eq!(room_manager.get_room_count().await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_to_room() {
        let room_manager = RoomManager::new();
        let (conn1, mut rx1) = connection(1);
        let (conn2, mut rx2) = connection(2);

        room_manager.join("admin", conn1).await;
        room_manager.join("admin", conn2).await;

        assert_eq!(room_manager.broadcast("admin", ServerEvent::Pong).await, 2);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_room_is_dropped() {
        let room_manager = RoomManager::new();
        assert_eq!(room_manager.broadcast("99", ServerEvent::Pong).await, 0);
        assert_eq!(room_manager.get_room_count().await, 0);
    }

    #[tokio::test]
    async fn test_union_broadcast_delivers_once() {
        let room_manager = RoomManager::new();
        let (admin, mut admin_rx) = connection(1);
        let (client, mut client_rx) = connection(42);

        room_manager.join("1", Arc::clone(&admin)).await;
        room_manager.join("admin", Arc::clone(&admin)).await;
        room_manager.join("42", Arc::clone(&client)).await;

        let recipients = room_manager
            .broadcast_to_rooms(&["42", "admin", "1"], ServerEvent::Pong)
            .await;

        assert_eq!(recipients, 2);
        assert_eq!(drain(&mut admin_rx), 1);
        assert_eq!(drain(&mut client_rx), 1);
    }

    #[tokio::test]
    async fn test_relay_skips_sender() {
        let room_manager = RoomManager::new();
        let (first, mut first_rx) = connection(1);
        let (second, mut second_rx) = connection(2);

        room_manager.join("admin", Arc::clone(&first)).await;
        room_manager.join("admin", Arc::clone(&second)).await;

        room_manager
            .relay("admin", ServerEvent::Pong, &first.session_id)
            .await;

        assert_eq!(drain(&mut first_rx), 0);
        assert_eq!(drain(&mut second_rx), 1);
    }

    #[tokio::test]
    async fn test_remove_connection_from_all_rooms() {
        let room_manager = RoomManager::new();
        let (conn, _rx) = connection(1);

        room_manager.join("1", Arc::clone(&conn)).await;
        room_manager.join("admin", Arc::clone(&conn)).await;
        assert_eq!(room_manager.get_room_count().await, 2);

        room_manager.remove_connection(&conn.session_id).await;
        assert_eq!(room_manager.get_room_count().await, 0);
    }
}
