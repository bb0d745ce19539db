//! Shared application state

use std::sync::Arc;
use supportchat_shared::MessageStore;

use crate::auth::AuthState;
use crate::config::Config;
use crate::delivery::{Delivery, FollowUpScheduler};
use crate::email::Mailer;
use crate::push::PushSender;
use crate::websocket::WebSocketState;

/// State handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn MessageStore>,
    pub ws_state: WebSocketState,
    pub delivery: Delivery,
    pub auth_state: AuthState,
}

impl AppState {
    /// Wire the realtime layer and the delivery pipeline around a store
    pub fn new(
        config: Config,
        store: Arc<dyn MessageStore>,
        push: Arc<dyn PushSender>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let ws_state = WebSocketState::new();
        let delivery = Delivery::new(
            Arc::clone(&store),
            ws_state.clone(),
            push,
            mailer,
            FollowUpScheduler::new(config.email_followup_delay),
            config.public_url.clone(),
        );
        let auth_state = AuthState::new(&config.jwt_secret);

        Self {
            config: Arc::new(config),
            store,
            ws_state,
            delivery,
            auth_state,
        }
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth_state.clone()
    }
}
