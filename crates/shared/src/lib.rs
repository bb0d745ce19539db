//! SupportChat Shared Types and Storage
//!
//! Domain types, conversation addressing and the message store shared by the
//! SupportChat server.

pub mod conversation;
pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use db::*;
pub use error::*;
pub use store::{MemoryMessageStore, MessageStore, PgMessageStore};
pub use types::*;
