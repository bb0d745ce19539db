//! WebSocket handler for Axum
//!
//! Handles WebSocket connections, authentication, and event routing.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::auth::AuthUser;
use crate::state::AppState;

use super::{
    connection::Connection,
    events::{ClientEvent, ConnectedAck, JoinPayload, JoinedAck, ServerEvent, TypingPayload},
};

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    token: String,
}

/// WebSocket handler - upgrades HTTP connection to WebSocket
/// Authenticates via query parameter token (browsers cannot set headers here)
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
    Query(params): Query<WebSocketQuery>,
) -> Result<Response, StatusCode> {
    let auth_user = app_state.auth_state.authenticate(&params.token).map_err(|_| {
        tracing::warn!("WebSocket auth failed: invalid token");
        StatusCode::UNAUTHORIZED
    })?;

    tracing::info!(user_id = %auth_user.user_id, "WebSocket connection upgrade requested");

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, auth_user, app_state)))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, auth_user: AuthUser, app_state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Create channel for sending events to this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let ws_state = app_state.ws_state.clone();
    let conn = ws_state
        .add_connection(Connection::new(auth_user.user_id, auth_user.role, tx))
        .await;
    let session_id = conn.session_id;

    // Send connection acknowledgment
    let _ = conn.send(ServerEvent::Connected(ConnectedAck {
        session_id,
        user_id: conn.user_id,
    }));

    // Spawn task to send messages to client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                }
            }
        }
    });

    // Handle incoming messages
    while let Some(msg) = receiver.next().await {
        let Ok(msg) = msg else {
            break;
        };
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => handle_client_event(event, &conn, &app_state).await,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        session_id = %session_id,
                        "Failed to parse client event"
                    );
                    let _ = conn.send(ServerEvent::error("Invalid event format"));
                }
            },
            Message::Close(_) => {
                tracing::info!(session_id = %session_id, "WebSocket close frame received");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Axum handles ping/pong automatically
            }
            Message::Binary(_) => {}
        }
    }

    // Cleanup on disconnect
    tracing::info!(session_id = %session_id, user_id = %conn.user_id, "WebSocket connection closing");
    ws_state.remove_connection(&session_id).await;
    send_task.abort();
}

/// Handle client event
async fn handle_client_event(event: ClientEvent, conn: &Arc<Connection>, app_state: &AppState) {
    match event {
        ClientEvent::Join(payload) => handle_join(payload, conn, app_state).await,
        ClientEvent::Typing(payload) => handle_typing(payload, conn, app_state).await,
        ClientEvent::Ping => {
            let _ = conn.send(ServerEvent::Pong);
        }
    }
}

async fn handle_join(payload: JoinPayload, conn: &Arc<Connection>, app_state: &AppState) {
    match app_state
        .ws_state
        .join_as(conn, payload.user_id, payload.is_admin)
        .await
    {
        Ok(rooms) => {
            tracing::debug!(session_id = %conn.session_id, rooms = ?rooms, "Connection joined");
            let _ = conn.send(ServerEvent::Joined(JoinedAck { rooms }));
        }
        Err(e) => {
            let _ = conn.send(ServerEvent::error(e.to_string()));
        }
    }
}

async fn handle_typing(payload: TypingPayload, conn: &Arc<Connection>, app_state: &AppState) {
    if let Err(e) = app_state.delivery.typing_from(conn, payload).await {
        tracing::debug!(session_id = %conn.session_id, error = %e, "Typing signal rejected");
        let _ = conn.send(ServerEvent::error(e.to_string()));
    }
}
