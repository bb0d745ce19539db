//! Message delivery
//!
//! Realtime fan-out, read receipts, typing relay and the offline notification
//! fallback (Web Push right away, email after a delay).

pub mod followup;
pub mod pipeline;

pub use followup::FollowUpScheduler;
pub use pipeline::{BroadcastReport, Delivery};
