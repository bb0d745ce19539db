//! Conversation addressing
//!
//! A conversation is keyed by the client id and has no row of its own. Every
//! realtime room name is derived from ids here so that the HTTP handlers, the
//! delivery pipeline and the websocket layer all agree on where events go.

use crate::types::{Message, SenderType, UserId};

/// Room every connected admin session joins
pub const ADMIN_ROOM: &str = "admin";

/// Personal room of an identity (client or admin)
pub fn user_room(user_id: UserId) -> String {
    user_id.to_string()
}

/// Rooms a freshly created message is delivered to.
///
/// The conversation room always comes first. Duplicates are removed, so a
/// client writing in its own conversation yields `["42", "admin"]`.
pub fn delivery_rooms(message: &Message) -> Vec<String> {
    let mut rooms = vec![user_room(message.client_id)];

    if message.sender_type == SenderType::Client {
        rooms.push(ADMIN_ROOM.to_string());
    }
    rooms.push(user_room(message.author_user_id));

    let mut seen = std::collections::HashSet::new();
    rooms.retain(|room| seen.insert(room.clone()));
    rooms
}

/// Rooms notified when a message is hard-deleted
pub fn deletion_rooms(message: &Message) -> Vec<String> {
    vec![user_room(message.client_id), ADMIN_ROOM.to_string()]
}

/// Room a typing signal is routed to: the opposite party of the sender
pub fn typing_room(client_id: UserId, sender_type: SenderType) -> String {
    match sender_type {
        SenderType::Admin => user_room(client_id),
        SenderType::Client => ADMIN_ROOM.to_string(),
    }
}
