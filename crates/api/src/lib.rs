//! SupportChat API Library
//!
//! Realtime customer-support chat: HTTP routes, the websocket room router, and
//! the delivery pipeline with push and email fallbacks.

pub mod auth;
pub mod config;
pub mod delivery;
pub mod email;
pub mod error;
pub mod push;
pub mod routes;
pub mod security;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
