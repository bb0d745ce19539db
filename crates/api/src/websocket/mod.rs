//! WebSocket support for real-time chat
//!
//! - **Connection**: an authenticated WebSocket connection and its rooms
//! - **Room**: named pub/sub groups (`"{user_id}"` and `"admin"`)
//! - **State**: every live connection plus the room registry
//! - **Handler**: Axum WebSocket route handler (join, typing, ping)
//! - **Events**: `{"event", "data"}` frames for both directions

pub mod connection;
pub mod events;
pub mod handler;
pub mod room;
pub mod state;

pub use handler::ws_handler;
pub use state::WebSocketState;
