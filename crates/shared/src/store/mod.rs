//! Message store
//!
//! Persisted, ordered log of messages per conversation together with the
//! client and push-subscription rows it owns. Two backends implement the same
//! trait: [`PgMessageStore`] for production and [`MemoryMessageStore`] for
//! development without a database and for tests.
//!
//! # Concurrency
//!
//! Every mutating operation is a single conditional statement (or a single
//! critical section in memory), so overlapping calls never lose updates:
//! - `mark_read` only flips rows that are still unread and reports exactly the
//!   rows it flipped, restricted to messages the reader may read.
//! - `delete_message` in `SelfOnly` mode is an atomic set-union on `deleted_by`.

mod memory;
mod postgres;

pub use memory::MemoryMessageStore;
pub use postgres::PgMessageStore;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::{
    AuthorProfile, Client, DeleteMode, Message, MessageId, NewMessage, NewPushSubscription,
    PushSubscription, ReadUpdate, Requester, Role, UnreadSummary, UserId,
};

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Return the client row, creating it from the profile if it is missing.
    /// An existing row gets its placeholder name and missing email filled in
    /// from the profile.
    async fn ensure_client(
        &self,
        client_id: UserId,
        owner_user_id: UserId,
        profile: Option<&AuthorProfile>,
    ) -> StoreResult<Client>;

    /// Persist a new unread message, creating the client row on first contact
    async fn create_message(
        &self,
        new: NewMessage,
        profile: Option<&AuthorProfile>,
    ) -> StoreResult<(Message, Client)>;

    async fn get_message(&self, id: MessageId) -> StoreResult<Option<Message>>;

    /// Messages of a conversation (or authored by the id), oldest first,
    /// without the ones the requester has hidden for themselves
    async fn list_conversation(
        &self,
        client_id: UserId,
        requester: UserId,
    ) -> StoreResult<Vec<Message>>;

    /// Delete a message; returns the message as it was before the delete
    async fn delete_message(
        &self,
        id: MessageId,
        requester: &Requester,
        mode: DeleteMode,
    ) -> StoreResult<Message>;

    /// Flip unread messages to read; returns only the rows actually changed.
    /// Ids the reader wrote or does not take part in are left alone.
    async fn mark_read(&self, ids: &[MessageId], reader: &Requester)
        -> StoreResult<Vec<ReadUpdate>>;

    async fn count_unread(&self, user_id: UserId, role: Role) -> StoreResult<UnreadSummary>;

    async fn get_client(&self, id: UserId) -> StoreResult<Option<Client>>;

    /// All clients ordered by name
    async fn list_clients(&self) -> StoreResult<Vec<Client>>;

    /// Remove a client with its messages and subscriptions
    async fn delete_client(&self, id: UserId) -> StoreResult<()>;

    /// Register a push endpoint; returns `false` if the endpoint was known
    async fn add_push_subscription(&self, new: NewPushSubscription) -> StoreResult<bool>;

    async fn push_subscriptions_for(&self, client_id: UserId) -> StoreResult<Vec<PushSubscription>>;

    /// Backend liveness check
    async fn ping(&self) -> StoreResult<()>;
}

/// Name/email for a new client row, falling back to placeholders
pub(crate) fn client_identity(profile: Option<&AuthorProfile>) -> (String, Option<String>) {
    let name = profile
        .and_then(|p| p.name.as_deref())
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(crate::types::DEFAULT_CLIENT_NAME)
        .to_string();
    let email = profile
        .and_then(|p| p.email.as_deref())
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string);
    (name, email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_identity_placeholders() {
        let (name, email) = client_identity(None);
        assert_eq!(name, "New client");
        assert_eq!(email, None);

        let profile = AuthorProfile {
            name: Some("  ".into()),
            email: Some("ana@example.com".into()),
        };
        let (name, email) = client_identity(Some(&profile));
        assert_eq!(name, "New client");
        assert_eq!(email.as_deref(), Some("ana@example.com"));
    }
}
