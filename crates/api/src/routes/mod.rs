//! API routes

pub mod clients;
pub mod health;
pub mod messages;
pub mod push;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    auth::require_auth,
    security::{security_headers_middleware, SecurityHeaders},
    state::AppState,
    websocket::ws_handler,
};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Public API routes (no auth required) - under /api/v1
    let public_api_routes = Router::new().route("/push/vapid-key", get(push::vapid_key));

    // Protected API routes (auth required) - under /api/v1
    let protected_api_routes = Router::new()
        // Messages
        .route("/messages", post(messages::create_message))
        .route("/messages/me", get(messages::list_my_messages))
        .route("/messages/unread/count", get(messages::unread_count))
        .route("/messages/mark-read", patch(messages::mark_read))
        .route("/messages/broadcast", post(messages::broadcast))
        .route(
            "/messages/:id",
            get(messages::list_conversation).delete(messages::delete_message),
        )
        // Clients (admin)
        .route("/clients", get(clients::list_clients))
        .route("/clients/:id", delete(clients::delete_client))
        // Push
        .route("/push/subscribe", post(push::subscribe))
        .layer(middleware::from_fn_with_state(auth_state, require_auth));

    // WebSocket routes (auth handled in handler via query parameter)
    let websocket_routes = Router::new().route("/ws", get(ws_handler));

    // Combine API routes under /api/v1 prefix
    let api_v1_routes = Router::new()
        .merge(public_api_routes)
        .merge(protected_api_routes)
        .merge(websocket_routes);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(middleware::from_fn_with_state(
            SecurityHeaders::for_public_url(&state.config.public_url),
            security_headers_middleware,
        ))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
