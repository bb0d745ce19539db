//! In-memory message store

use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{client_identity, MessageStore};
use crate::error::{StoreError, StoreResult};
use crate::types::{
    AuthorProfile, Client, ClientUnread, DeleteMode, Message, MessageId, NewMessage,
    NewPushSubscription, PushSubscription, ReadUpdate, Requester, Role, SenderType,
    UnreadSummary, UserId,
};

#[derive(Default)]
struct Inner {
    next_message_id: i64,
    next_subscription_id: i64,
    messages: BTreeMap<MessageId, Message>,
    clients: HashMap<UserId, Client>,
    subscriptions: Vec<PushSubscription>,
}

impl Inner {
    fn ensure_client(
        &mut self,
        client_id: UserId,
        owner_user_id: UserId,
        profile: Option<&AuthorProfile>,
    ) -> Client {
        let (name, email) = client_identity(profile);
        match self.clients.entry(client_id) {
            Entry::Occupied(mut entry) => {
                let client = entry.get_mut();
                if profile.is_some() && client.complete_from(&name, email.as_deref()) {
                    tracing::info!(client_id = %client_id, "Client record completed from profile");
                }
                client.clone()
            }
            Entry::Vacant(entry) => {
                tracing::info!(client_id = %client_id, "Creating client record on first contact");
                entry
                    .insert(Client {
                        id: client_id,
                        name,
                        email,
                        owner_user_id,
                        created_at: OffsetDateTime::now_utc(),
                    })
                    .clone()
            }
        }
    }
}

/// Message store kept in process memory. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryMessageStore {
    inner: RwLock<Inner>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn ensure_client(
        &self,
        client_id: UserId,
        owner_user_id: UserId,
        profile: Option<&AuthorProfile>,
    ) -> StoreResult<Client> {
        let mut inner = self.inner.write().await;
        Ok(inner.ensure_client(client_id, owner_user_id, profile))
    }

    async fn create_message(
        &self,
        new: NewMessage,
        profile: Option<&AuthorProfile>,
    ) -> StoreResult<(Message, Client)> {
        let mut inner = self.inner.write().await;
        let client = inner.ensure_client(new.client_id, new.author_user_id, profile);

        inner.next_message_id += 1;
        let message = Message {
            id: MessageId(inner.next_message_id),
            content: new.content,
            kind: new.kind,
            sender_type: new.sender_type,
            client_id: client.id,
            author_user_id: new.author_user_id,
            created_at: OffsetDateTime::now_utc(),
            is_read: false,
            read_at: None,
            deleted_by: Vec::new(),
        };
        inner.messages.insert(message.id, message.clone());

        Ok((message, client))
    }

    async fn get_message(&self, id: MessageId) -> StoreResult<Option<Message>> {
        let inner = self.inner.read().await;
        Ok(inner.messages.get(&id).cloned())
    }

    async fn list_conversation(
        &self,
        client_id: UserId,
        requester: UserId,
    ) -> StoreResult<Vec<Message>> {
        let inner = self.inner.read().await;
        let mut messages: Vec<Message> = inner
            .messages
            .values()
            .filter(|m| m.client_id == client_id || m.author_user_id == client_id)
            .filter(|m| !m.is_hidden_for(requester))
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(messages)
    }

    async fn delete_message(
        &self,
        id: MessageId,
        requester: &Requester,
        mode: DeleteMode,
    ) -> StoreResult<Message> {
        let mut inner = self.inner.write().await;
        let message = inner
            .messages
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("message {id}")))?;

        match mode {
            DeleteMode::All => {
                if message.author_user_id != requester.user_id {
                    return Err(StoreError::Forbidden(
                        "only the author can delete a message for everyone".into(),
                    ));
                }
                inner
                    .messages
                    .remove(&id)
                    .ok_or_else(|| StoreError::NotFound(format!("message {id}")))
            }
            DeleteMode::SelfOnly => {
                if !message.is_participant(requester) {
                    return Err(StoreError::Forbidden(
                        "not a participant of this conversation".into(),
                    ));
                }
                let before = message.clone();
                if !message.deleted_by.contains(&requester.user_id) {
                    message.deleted_by.push(requester.user_id);
                }
                Ok(before)
            }
        }
    }

    async fn mark_read(
        &self,
        ids: &[MessageId],
        reader: &Requester,
    ) -> StoreResult<Vec<ReadUpdate>> {
        let mut inner = self.inner.write().await;
        let now = OffsetDateTime::now_utc();
        let mut updated = Vec::new();

        for id in ids {
            if let Some(message) = inner.messages.get_mut(id) {
                if !message.is_read && message.is_readable_by(reader) {
                    message.is_read = true;
                    message.read_at = Some(now);
                    updated.push(ReadUpdate {
                        id: message.id,
                        author_user_id: message.author_user_id,
                        client_id: message.client_id,
                    });
                }
            }
        }

        updated.sort_by_key(|u| u.id);
        Ok(updated)
    }

    async fn count_unread(&self, user_id: UserId, role: Role) -> StoreResult<UnreadSummary> {
        let inner = self.inner.read().await;
        let wanted_sender = SenderType::from(role).opposite();
        let mut per_client: BTreeMap<UserId, i64> = BTreeMap::new();

        for message in inner.messages.values() {
            if message.is_read || message.sender_type != wanted_sender {
                continue;
            }
            if role == Role::Client && message.client_id != user_id {
                continue;
            }
            if message.is_hidden_for(user_id) {
                continue;
            }
            *per_client.entry(message.client_id).or_insert(0) += 1;
        }

        let unread_by_client: Vec<ClientUnread> = per_client
            .into_iter()
            .map(|(client_id, count)| ClientUnread { client_id, count })
            .collect();

        Ok(UnreadSummary {
            unread_count: unread_by_client.iter().map(|c| c.count).sum(),
            unread_by_client,
        })
    }

    async fn get_client(&self, id: UserId) -> StoreResult<Option<Client>> {
        let inner = self.inner.read().await;
        Ok(inner.clients.get(&id).cloned())
    }

    async fn list_clients(&self) -> StoreResult<Vec<Client>> {
        let inner = self.inner.read().await;
        let mut clients: Vec<Client> = inner.clients.values().cloned().collect();
        clients.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(clients)
    }

    async fn delete_client(&self, id: UserId) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.clients.remove(&id).is_none() {
            return Err(StoreError::NotFound(format!("client {id}")));
        }
        inner.messages.retain(|_, m| m.client_id != id);
        inner.subscriptions.retain(|s| s.client_id != id);
        Ok(())
    }

    async fn add_push_subscription(&self, new: NewPushSubscription) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        if !inner.clients.contains_key(&new.client_id) {
            return Err(StoreError::NotFound(format!("client {}", new.client_id)));
        }
        if inner.subscriptions.iter().any(|s| s.endpoint == new.endpoint) {
            return Ok(false);
        }

        inner.next_subscription_id += 1;
        let subscription = PushSubscription {
            id: inner.next_subscription_id,
            endpoint: new.endpoint,
            keys: new.keys,
            client_id: new.client_id,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.subscriptions.push(subscription);
        Ok(true)
    }

    async fn push_subscriptions_for(&self, client_id: UserId) -> StoreResult<Vec<PushSubscription>> {
        let inner = self.inner.read().await;
        Ok(inner
            .subscriptions
            .iter()
            .filter(|s| s.client_id == client_id)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
