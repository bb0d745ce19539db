//! Delivery pipeline
//!
//! Turns store mutations into realtime events and offline notifications:
//! - new messages fan out to the conversation, admin and author rooms
//! - admin replies are pushed to the client's browsers and schedule a fallback
//!   email that fires only if the reply is still unread after the delay
//! - read receipts go back to the author of each read message
//! - hard deletes are announced to both sides of the conversation

use std::collections::BTreeMap;
use std::sync::Arc;
use supportchat_shared::conversation::{deletion_rooms, delivery_rooms, typing_room, user_room};
use supportchat_shared::{
    Client, Message, MessageId, MessageKind, MessageStore, NewMessage, ReadUpdate, SenderType,
    UserId,
};
use uuid::Uuid;

use super::followup::FollowUpScheduler;
use crate::email::{unread_reply_email, Mailer};
use crate::push::{PushError, PushPayload, PushSender};
use crate::websocket::connection::{Connection, ConnectionPhase, SessionError};
use crate::websocket::events::{DeletedMessage, ReadReceipt, ServerEvent, TypingPayload};
use crate::websocket::WebSocketState;

/// Notification icon served by the web client
const PUSH_ICON_PATH: &str = "/icons/support-192.png";

/// Result of an admin broadcast to every client
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastReport {
    pub count: usize,
    pub client_ids: Vec<UserId>,
}

/// Fan-out and offline notification service
#[derive(Clone)]
pub struct Delivery {
    store: Arc<dyn MessageStore>,
    ws_state: WebSocketState,
    push: Arc<dyn PushSender>,
    mailer: Arc<dyn Mailer>,
    followups: FollowUpScheduler,
    public_url: String,
}

impl Delivery {
    pub fn new(
        store: Arc<dyn MessageStore>,
        ws_state: WebSocketState,
        push: Arc<dyn PushSender>,
        mailer: Arc<dyn Mailer>,
        followups: FollowUpScheduler,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            ws_state,
            push,
            mailer,
            followups,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn followups(&self) -> &FollowUpScheduler {
        &self.followups
    }

    /// Deep link that opens a conversation in the web client
    pub fn chat_link(&self, client_id: UserId) -> String {
        chat_link(&self.public_url, client_id)
    }

    /// Deliver a freshly persisted message
    pub async fn message_created(&self, message: &Message, client: &Client) {
        let rooms = delivery_rooms(message);
        let recipients = self
            .ws_state
            .rooms
            .broadcast_to_rooms(rooms.as_slice(), ServerEvent::NewMessage(message.clone()))
            .await;

        tracing::info!(
            message_id = %message.id,
            client_id = %message.client_id,
            sender_type = message.sender_type.as_str(),
            rooms = ?rooms,
            recipients,
            "Message delivered"
        );

        if message.sender_type != SenderType::Admin {
            return;
        }

        // Push services can be slow; the caller does not wait for them
        let delivery = self.clone();
        let pushed = message.clone();
        tokio::spawn(async move {
            delivery.dispatch_push(&pushed).await;
        });

        if client.email.is_some() {
            self.schedule_followup(message.id).await;
        } else {
            tracing::debug!(client_id = %client.id, "Client has no email; no follow-up scheduled");
        }
    }

    /// Push an admin reply to every subscription of the client. Each endpoint
    /// is attempted independently and failures are only logged.
    async fn dispatch_push(&self, message: &Message) {
        let subscriptions = match self.store.push_subscriptions_for(message.client_id).await {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                tracing::error!(error = %e, client_id = %message.client_id, "Failed to load push subscriptions");
                return;
            }
        };
        if subscriptions.is_empty() {
            return;
        }

        let payload = PushPayload::support_reply(
            &message.content,
            self.chat_link(message.client_id),
            format!("{}{}", self.public_url, PUSH_ICON_PATH),
        );

        let sends = subscriptions.iter().map(|subscription| {
            let payload = &payload;
            async move {
                match self.push.send(subscription, payload).await {
                    Ok(()) => true,
                    Err(PushError::Gone) => {
                        tracing::warn!(endpoint = %subscription.endpoint, "Push subscription expired");
                        false
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, endpoint = %subscription.endpoint, "Push notification failed");
                        false
                    }
                }
            }
        });
        let results = futures::future::join_all(sends).await;

        tracing::debug!(
            client_id = %message.client_id,
            attempted = results.len(),
            delivered = results.iter().filter(|ok| **ok).count(),
            "Push dispatch finished"
        );
    }

    async fn schedule_followup(&self, message_id: MessageId) {
        let store = Arc::clone(&self.store);
        let mailer = Arc::clone(&self.mailer);
        let link_base = self.public_url.clone();

        self.followups
            .schedule(message_id, async move {
                send_unread_followup(store, mailer, &link_base, message_id).await;
            })
            .await;
    }

    /// Emit read receipts for the rows a mark-read call actually flipped
    pub async fn messages_read(&self, updates: &[ReadUpdate], read_by: UserId) {
        if updates.is_empty() {
            return;
        }

        let mut by_author: BTreeMap<UserId, Vec<MessageId>> = BTreeMap::new();
        for update in updates {
            by_author.entry(update.author_user_id).or_default().push(update.id);
        }

        for (author, message_ids) in by_author {
            let room = user_room(author);
            self.ws_state
                .rooms
                .broadcast(
                    &room,
                    ServerEvent::MessageRead(ReadReceipt {
                        message_ids,
                        read_by,
                    }),
                )
                .await;
        }

        let ids: Vec<MessageId> = updates.iter().map(|u| u.id).collect();
        self.followups.cancel(&ids).await;
    }

    /// Announce a hard delete to both sides of the conversation
    pub async fn message_deleted(&self, message: &Message) {
        self.ws_state
            .rooms
            .broadcast_to_rooms(
                deletion_rooms(message).as_slice(),
                ServerEvent::MessageDeleted(DeletedMessage { id: message.id }),
            )
            .await;
        self.followups.cancel(&[message.id]).await;
    }

    /// Relay a typing signal from a live connection. The sender side comes
    /// from the connection's role, and clients may only type in their own
    /// conversation.
    pub async fn typing_from(
        &self,
        conn: &Connection,
        payload: TypingPayload,
    ) -> Result<usize, SessionError> {
        if conn.phase().await != ConnectionPhase::Joined {
            return Err(SessionError::NotJoined);
        }

        let sender_type = SenderType::from(conn.role);
        if sender_type == SenderType::Client && payload.client_id != conn.user_id {
            return Err(SessionError::ForeignConversation);
        }

        let payload = TypingPayload {
            sender_type,
            ..payload
        };
        Ok(self.typing(payload, &conn.session_id).await)
    }

    /// Relay a typing signal to the opposite party
    async fn typing(&self, payload: TypingPayload, origin: &Uuid) -> usize {
        let room = typing_room(payload.client_id, payload.sender_type);
        self.ws_state
            .rooms
            .relay(&room, ServerEvent::DisplayTyping(payload), origin)
            .await
    }

    /// Send one admin message to every known client. Failures for a single
    /// client are logged and skipped.
    pub async fn broadcast_to_all_clients(
        &self,
        admin_id: UserId,
        content: &str,
        kind: MessageKind,
    ) -> Result<BroadcastReport, supportchat_shared::StoreError> {
        let clients = self.store.list_clients().await?;
        let mut report = BroadcastReport::default();

        for client in clients {
            let new = NewMessage {
                content: content.to_string(),
                kind,
                sender_type: SenderType::Admin,
                author_user_id: admin_id,
                client_id: client.id,
            };

            match self.store.create_message(new, None).await {
                Ok((message, _)) => {
                    self.ws_state
                        .rooms
                        .broadcast(&user_room(client.id), ServerEvent::NewMessage(message))
                        .await;
                    report.client_ids.push(client.id);
                }
                Err(e) => {
                    tracing::warn!(error = %e, client_id = %client.id, "Broadcast to client failed");
                }
            }
        }

        report.count = report.client_ids.len();
        tracing::info!(admin_id = %admin_id, count = report.count, "Broadcast sent to all clients");
        Ok(report)
    }
}

fn chat_link(public_url: &str, client_id: UserId) -> String {
    format!("{}/index.html?chat={}", public_url, client_id)
}

/// Fallback email for an admin reply that is still unread
async fn send_unread_followup(
    store: Arc<dyn MessageStore>,
    mailer: Arc<dyn Mailer>,
    public_url: &str,
    message_id: MessageId,
) {
    let message = match store.get_message(message_id).await {
        Ok(Some(message)) => message,
        Ok(None) => {
            tracing::debug!(message_id = %message_id, "Follow-up skipped: message deleted");
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, message_id = %message_id, "Follow-up lookup failed");
            return;
        }
    };
    if message.is_read {
        tracing::debug!(message_id = %message_id, "Follow-up skipped: message already read");
        return;
    }

    let client = match store.get_client(message.client_id).await {
        Ok(Some(client)) => client,
        Ok(None) => return,
        Err(e) => {
            tracing::error!(error = %e, client_id = %message.client_id, "Follow-up client lookup failed");
            return;
        }
    };
    let Some(email) = client.email.as_deref() else {
        return;
    };

    let link = chat_link(public_url, client.id);
    let (subject, html) = unread_reply_email(&client.name, &message.content, &link);

    match mailer.send(email, &subject, &html).await {
        Ok(()) => tracing::info!(
            message_id = %message_id,
            client_id = %client.id,
            "Unread reply follow-up email sent"
        ),
        Err(e) => tracing::error!(
            error = %e,
            message_id = %message_id,
            "Failed to send follow-up email"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::MailError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use supportchat_shared::{
        AuthorProfile, MemoryMessageStore, NewPushSubscription, PushKeys, PushSubscription,
        Requester, Role,
    };
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingPush {
        sent: Mutex<Vec<(String, PushPayload)>>,
        fail_endpoint: Option<String>,
        latency: Duration,
    }

    #[async_trait]
    impl PushSender for RecordingPush {
        async fn send(
            &self,
            subscription: &PushSubscription,
            payload: &PushPayload,
        ) -> Result<(), PushError> {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            if self.fail_endpoint.as_deref() == Some(subscription.endpoint.as_str()) {
                return Err(PushError::Delivery("boom".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((subscription.endpoint.clone(), payload.clone()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), MailError> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), html.to_string()));
            Ok(())
        }
    }

    struct Harness {
        store: Arc<MemoryMessageStore>,
        ws_state: WebSocketState,
        push: Arc<RecordingPush>,
        mailer: Arc<RecordingMailer>,
        delivery: Delivery,
    }

    fn harness_with(push: RecordingPush) -> Harness {
        let store = Arc::new(MemoryMessageStore::new());
        let ws_state = WebSocketState::new();
        let push = Arc::new(push);
        let mailer = Arc::new(RecordingMailer::default());
        let delivery = Delivery::new(
            store.clone(),
            ws_state.clone(),
            push.clone(),
            mailer.clone(),
            FollowUpScheduler::new(Duration::from_secs(600)),
            "https://chat.example.com/",
        );
        Harness {
            store,
            ws_state,
            push,
            mailer,
            delivery,
        }
    }

    fn harness() -> Harness {
        harness_with(RecordingPush::default())
    }

    async fn connect(
        ws_state: &WebSocketState,
        user_id: i64,
        role: Role,
    ) -> (Arc<Connection>, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = ws_state
            .add_connection(Connection::new(UserId(user_id), role, tx))
            .await;
        ws_state.join(&conn, role.is_admin()).await;
        (conn, rx)
    }

    /// Let spawned push tasks run (paused clock only advances once idle)
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    async fn subscribe(h: &Harness, client: i64, endpoint: &str) {
        h.store
            .add_push_subscription(NewPushSubscription {
                endpoint: endpoint.into(),
                keys: PushKeys {
                    p256dh: "p".into(),
                    auth: "a".into(),
                },
                client_id: UserId(client),
            })
            .await
            .unwrap();
    }

    fn received(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn profile(email: Option<&str>) -> AuthorProfile {
        AuthorProfile {
            name: Some("Ana".into()),
            email: email.map(str::to_string),
        }
    }

    async fn create(
        h: &Harness,
        sender_type: SenderType,
        author: i64,
        client: i64,
        content: &str,
        email: Option<&str>,
    ) -> (Message, Client) {
        h.store
            .create_message(
                NewMessage {
                    content: content.into(),
                    kind: MessageKind::Text,
                    sender_type,
                    author_user_id: UserId(author),
                    client_id: UserId(client),
                },
                Some(&profile(email)),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_client_message_reaches_client_and_admins() {
        let h = harness();
        let (_client, mut client_rx) = connect(&h.ws_state, 42, Role::Client).await;
        let (_admin, mut admin_rx) = connect(&h.ws_state, 1, Role::Admin).await;
        let (_other, mut other_rx) = connect(&h.ws_state, 43, Role::Client).await;

        let (message, client) = create(&h, SenderType::Client, 42, 42, "Hello", None).await;
        h.delivery.message_created(&message, &client).await;

        assert!(matches!(&received(&mut client_rx)[..], [ServerEvent::NewMessage(m)] if m.id == message.id));
        assert_eq!(received(&mut admin_rx).len(), 1);
        assert!(received(&mut other_rx).is_empty());

        // Client messages never trigger offline notifications
        assert!(h.push.sent.lock().unwrap().is_empty());
        assert_eq!(h.delivery.followups().pending().await, 0);
    }

    #[tokio::test]
    async fn test_admin_reply_echoes_to_author_not_admin_room() {
        let h = harness();
        let (_client, mut client_rx) = connect(&h.ws_state, 42, Role::Client).await;
        let (_author, mut author_rx) = connect(&h.ws_state, 1, Role::Admin).await;
        let (_peer, mut peer_rx) = connect(&h.ws_state, 2, Role::Admin).await;

        let (message, client) = create(&h, SenderType::Admin, 1, 42, "Hi there", None).await;
        h.delivery.message_created(&message, &client).await;

        assert_eq!(received(&mut client_rx).len(), 1);
        assert_eq!(received(&mut author_rx).len(), 1);
        assert!(received(&mut peer_rx).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_admin_reply_pushes_each_subscription_independently() {
        let h = harness_with(RecordingPush {
            fail_endpoint: Some("https://push.example.com/broken".into()),
            ..Default::default()
        });
        h.store
            .ensure_client(UserId(42), UserId(42), Some(&profile(None)))
            .await
            .unwrap();
        for endpoint in ["https://push.example.com/broken", "https://push.example.com/ok"] {
            subscribe(&h, 42, endpoint).await;
        }

        let content = "x".repeat(60);
        let (message, client) = create(&h, SenderType::Admin, 1, 42, &content, None).await;
        h.delivery.message_created(&message, &client).await;
        settle().await;

        let sent = h.push.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "https://push.example.com/ok");
        assert_eq!(sent[0].1.body, format!("{}...", "x".repeat(50)));
        assert_eq!(sent[0].1.url, "https://chat.example.com/index.html?chat=42");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_push_does_not_hold_up_delivery() {
        let h = harness_with(RecordingPush {
            latency: Duration::from_secs(30),
            ..Default::default()
        });
        let (_client, mut client_rx) = connect(&h.ws_state, 42, Role::Client).await;
        h.store
            .ensure_client(UserId(42), UserId(42), Some(&profile(None)))
            .await
            .unwrap();
        subscribe(&h, 42, "https://push.example.com/slow").await;

        let started = tokio::time::Instant::now();
        let (message, client) = create(&h, SenderType::Admin, 1, 42, "Hi", None).await;
        h.delivery.message_created(&message, &client).await;

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(received(&mut client_rx).len(), 1);
        assert!(h.push.sent.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(h.push.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unread_reply_sends_one_email_after_delay() {
        let h = harness();
        let (message, client) =
            create(&h, SenderType::Admin, 1, 42, "Your order shipped", Some("ana@example.com")).await;
        h.delivery.message_created(&message, &client).await;
        assert_eq!(h.delivery.followups().pending().await, 1);

        tokio::time::sleep(Duration::from_secs(599)).await;
        assert!(h.mailer.sent.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let sent = h.mailer.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "ana@example.com");
        assert!(sent[0].2.contains("Your order shipped"));
        assert!(sent[0].2.contains("https://chat.example.com/index.html?chat=42"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_reply_cancels_email() {
        let h = harness();
        let (_author, mut author_rx) = connect(&h.ws_state, 1, Role::Admin).await;
        let (message, client) =
            create(&h, SenderType::Admin, 1, 42, "Ping", Some("ana@example.com")).await;
        h.delivery.message_created(&message, &client).await;
        received(&mut author_rx);

        let updates = h.store.mark_read(&[message.id], &Requester::client(42)).await.unwrap();
        h.delivery.messages_read(&updates, UserId(42)).await;

        match &received(&mut author_rx)[..] {
            [ServerEvent::MessageRead(receipt)] => {
                assert_eq!(receipt.message_ids, vec![message.id]);
                assert_eq!(receipt.read_by, UserId(42));
            }
            other => panic!("Expected one read receipt, got {:?}", other),
        }
        assert_eq!(h.delivery.followups().pending().await, 0);

        tokio::time::sleep(Duration::from_secs(700)).await;
        assert!(h.mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_followup_rechecks_read_state() {
        let h = harness();
        let (message, client) =
            create(&h, SenderType::Admin, 1, 42, "Ping", Some("ana@example.com")).await;
        h.delivery.message_created(&message, &client).await;

        // Read without going through the pipeline: the task still fires but
        // must notice the message is read
        h.store.mark_read(&[message.id], &Requester::client(42)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(700)).await;
        assert!(h.mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_receipts_batched_per_author() {
        let h = harness();
        let (_client, mut client_rx) = connect(&h.ws_state, 42, Role::Client).await;
        let (_admin, mut admin_rx) = connect(&h.ws_state, 1, Role::Admin).await;

        let (first, _) = create(&h, SenderType::Client, 42, 42, "one", None).await;
        let (second, _) = create(&h, SenderType::Client, 42, 42, "two", None).await;
        let (reply, _) = create(&h, SenderType::Admin, 1, 42, "three", None).await;

        let updates = h
            .store
            .mark_read(&[first.id, second.id, reply.id], &Requester::admin(2))
            .await
            .unwrap();
        h.delivery.messages_read(&updates, UserId(2)).await;

        match &received(&mut client_rx)[..] {
            [ServerEvent::MessageRead(receipt)] => {
                assert_eq!(receipt.message_ids, vec![first.id, second.id]);
            }
            other => panic!("Expected one batched receipt, got {:?}", other),
        }
        assert!(matches!(&received(&mut admin_rx)[..], [ServerEvent::MessageRead(r)] if r.message_ids == vec![reply.id]));

        // Nothing changes the second time, so nothing is emitted
        let again = h.store.mark_read(&[first.id], &Requester::admin(2)).await.unwrap();
        h.delivery.messages_read(&again, UserId(2)).await;
        assert!(received(&mut client_rx).is_empty());
    }

    #[tokio::test]
    async fn test_hard_delete_notifies_both_sides() {
        let h = harness();
        let (_client, mut client_rx) = connect(&h.ws_state, 42, Role::Client).await;
        let (_admin, mut admin_rx) = connect(&h.ws_state, 1, Role::Admin).await;

        let (message, _) = create(&h, SenderType::Client, 42, 42, "oops", None).await;
        h.delivery.message_deleted(&message).await;

        assert!(matches!(&received(&mut client_rx)[..], [ServerEvent::MessageDeleted(d)] if d.id == message.id));
        assert_eq!(received(&mut admin_rx).len(), 1);
    }

    #[tokio::test]
    async fn test_typing_goes_to_opposite_party() {
        let h = harness();
        let (client, mut client_rx) = connect(&h.ws_state, 42, Role::Client).await;
        let (admin, mut admin_rx) = connect(&h.ws_state, 1, Role::Admin).await;

        let from_client = TypingPayload {
            client_id: UserId(42),
            sender_type: SenderType::Client,
            is_typing: true,
        };
        assert_eq!(h.delivery.typing(from_client, &client.session_id).await, 1);
        assert!(matches!(&received(&mut admin_rx)[..], [ServerEvent::DisplayTyping(_)]));
        assert!(received(&mut client_rx).is_empty());

        let from_admin = TypingPayload {
            client_id: UserId(42),
            sender_type: SenderType::Admin,
            is_typing: false,
        };
        h.delivery.typing(from_admin, &admin.session_id).await;
        assert!(matches!(&received(&mut client_rx)[..], [ServerEvent::DisplayTyping(p)] if !p.is_typing));
    }

    #[tokio::test]
    async fn test_typing_side_comes_from_connection_role() {
        let h = harness();
        let (client, _client_rx) = connect(&h.ws_state, 42, Role::Client).await;
        let (_admin, mut admin_rx) = connect(&h.ws_state, 1, Role::Admin).await;

        // A client claiming to be the admin side still reaches the admin room
        let claimed = TypingPayload {
            client_id: UserId(42),
            sender_type: SenderType::Admin,
            is_typing: true,
        };
        assert_eq!(h.delivery.typing_from(&client, claimed).await, Ok(1));
        assert!(matches!(
            &received(&mut admin_rx)[..],
            [ServerEvent::DisplayTyping(p)] if p.sender_type == SenderType::Client
        ));
    }

    #[tokio::test]
    async fn test_client_cannot_type_in_another_conversation() {
        let h = harness();
        let (client, _client_rx) = connect(&h.ws_state, 42, Role::Client).await;
        let (_other, mut other_rx) = connect(&h.ws_state, 43, Role::Client).await;
        let (_admin, mut admin_rx) = connect(&h.ws_state, 1, Role::Admin).await;

        let foreign = TypingPayload {
            client_id: UserId(43),
            sender_type: SenderType::Client,
            is_typing: true,
        };
        assert_eq!(
            h.delivery.typing_from(&client, foreign).await,
            Err(SessionError::ForeignConversation)
        );
        assert!(received(&mut other_rx).is_empty());
        assert!(received(&mut admin_rx).is_empty());
    }

    #[tokio::test]
    async fn test_typing_requires_join() {
        let h = harness();
        let (tx, _rx) = mpsc::unbounded_channel();
        let idle = h
            .ws_state
            .add_connection(Connection::new(UserId(1), Role::Admin, tx))
            .await;
        let (_client, mut client_rx) = connect(&h.ws_state, 42, Role::Client).await;

        let payload = TypingPayload {
            client_id: UserId(42),
            sender_type: SenderType::Admin,
            is_typing: true,
        };
        assert_eq!(
            h.delivery.typing_from(&idle, payload).await,
            Err(SessionError::NotJoined)
        );
        assert!(received(&mut client_rx).is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_client_room() {
        let h = harness();
        for id in [42, 43] {
            h.store
                .ensure_client(UserId(id), UserId(id), None)
                .await
                .unwrap();
        }
        let (_c42, mut rx42) = connect(&h.ws_state, 42, Role::Client).await;
        let (_c43, mut rx43) = connect(&h.ws_state, 43, Role::Client).await;

        let report = h
            .delivery
            .broadcast_to_all_clients(UserId(1), "Maintenance tonight", MessageKind::Text)
            .await
            .unwrap();

        assert_eq!(report.count, 2);
        assert_eq!(received(&mut rx42).len(), 1);
        assert_eq!(received(&mut rx43).len(), 1);
        assert_eq!(h.store.list_conversation(UserId(42), UserId(42)).await.unwrap().len(), 1);
        assert!(h.push.sent.lock().unwrap().is_empty());
    }
}
