//! PostgreSQL message store

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use super::{client_identity, MessageStore};
use crate::error::{StoreError, StoreResult};
use crate::types::{
    AuthorProfile, Client, ClientUnread, DeleteMode, Message, MessageId, MessageKind, NewMessage,
    NewPushSubscription, PushKeys, PushSubscription, ReadUpdate, Requester, Role, SenderType,
    UnreadSummary, UserId, DEFAULT_CLIENT_NAME,
};

const MESSAGE_COLUMNS: &str = "id, content, kind, sender_type, client_id, author_user_id, \
                               created_at, is_read, read_at, deleted_by";

const CLIENT_COLUMNS: &str = "id, name, email, owner_user_id, created_at";

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct MessageRow {
    id: i64,
    content: String,
    kind: MessageKind,
    sender_type: SenderType,
    client_id: i64,
    author_user_id: i64,
    created_at: OffsetDateTime,
    is_read: bool,
    read_at: Option<OffsetDateTime>,
    deleted_by: Vec<i64>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: MessageId(row.id),
            content: row.content,
            kind: row.kind,
            sender_type: row.sender_type,
            client_id: UserId(row.client_id),
            author_user_id: UserId(row.author_user_id),
            created_at: row.created_at,
            is_read: row.is_read,
            read_at: row.read_at,
            deleted_by: row.deleted_by.into_iter().map(UserId).collect(),
        }
    }
}

#[derive(Debug, FromRow)]
struct ClientRow {
    id: i64,
    name: String,
    email: Option<String>,
    owner_user_id: i64,
    created_at: OffsetDateTime,
}

impl From<ClientRow> for Client {
    fn from(row: ClientRow) -> Self {
        Client {
            id: UserId(row.id),
            name: row.name,
            email: row.email,
            owner_user_id: UserId(row.owner_user_id),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct SubscriptionRow {
    id: i64,
    endpoint: String,
    p256dh: String,
    auth: String,
    client_id: i64,
    created_at: OffsetDateTime,
}

impl From<SubscriptionRow> for PushSubscription {
    fn from(row: SubscriptionRow) -> Self {
        PushSubscription {
            id: row.id,
            endpoint: row.endpoint,
            keys: PushKeys {
                p256dh: row.p256dh,
                auth: row.auth,
            },
            client_id: UserId(row.client_id),
            created_at: row.created_at,
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// Message store backed by PostgreSQL
#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_client<'e, E>(
        executor: E,
        client_id: UserId,
        owner_user_id: UserId,
        profile: Option<&AuthorProfile>,
    ) -> Result<(), sqlx::Error>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let (name, email) = client_identity(profile);
        // An existing row only gains what it lacks: the placeholder name and
        // a missing email are filled from the profile
        sqlx::query(
            r#"
            INSERT INTO clients (id, name, email, owner_user_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                email = COALESCE(clients.email, EXCLUDED.email),
                name = CASE WHEN clients.name = $5 THEN EXCLUDED.name ELSE clients.name END
            "#,
        )
        .bind(client_id.0)
        .bind(name)
        .bind(email)
        .bind(owner_user_id.0)
        .bind(DEFAULT_CLIENT_NAME)
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn ensure_client(
        &self,
        client_id: UserId,
        owner_user_id: UserId,
        profile: Option<&AuthorProfile>,
    ) -> StoreResult<Client> {
        Self::insert_client(&self.pool, client_id, owner_user_id, profile).await?;

        let row: ClientRow =
            sqlx::query_as(&format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = $1"))
                .bind(client_id.0)
                .fetch_one(&self.pool)
                .await?;
        Ok(row.into())
    }

    async fn create_message(
        &self,
        new: NewMessage,
        profile: Option<&AuthorProfile>,
    ) -> StoreResult<(Message, Client)> {
        let mut tx = self.pool.begin().await?;

        Self::insert_client(&mut *tx, new.client_id, new.author_user_id, profile).await?;
        let client: ClientRow =
            sqlx::query_as(&format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = $1"))
                .bind(new.client_id.0)
                .fetch_one(&mut *tx)
                .await?;

        let message: MessageRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO messages (content, kind, sender_type, client_id, author_user_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(&new.content)
        .bind(new.kind)
        .bind(new.sender_type)
        .bind(new.client_id.0)
        .bind(new.author_user_id.0)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((message.into(), client.into()))
    }

    async fn get_message(&self, id: MessageId) -> StoreResult<Option<Message>> {
        let row: Option<MessageRow> =
            sqlx::query_as(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Into::into))
    }

    async fn list_conversation(
        &self,
        client_id: UserId,
        requester: UserId,
    ) -> StoreResult<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE (client_id = $1 OR author_user_id = $1)
              AND NOT ($2 = ANY(deleted_by))
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(client_id.0)
        .bind(requester.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_message(
        &self,
        id: MessageId,
        requester: &Requester,
        mode: DeleteMode,
    ) -> StoreResult<Message> {
        let existing: Message = self
            .get_message(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("message {id}")))?;

        match mode {
            DeleteMode::All => {
                if existing.author_user_id != requester.user_id {
                    return Err(StoreError::Forbidden(
                        "only the author can delete a message for everyone".into(),
                    ));
                }

                let deleted: Option<MessageRow> = sqlx::query_as(&format!(
                    "DELETE FROM messages WHERE id = $1 AND author_user_id = $2 RETURNING {MESSAGE_COLUMNS}"
                ))
                .bind(id.0)
                .bind(requester.user_id.0)
                .fetch_optional(&self.pool)
                .await?;

                deleted
                    .map(Into::into)
                    .ok_or_else(|| StoreError::NotFound(format!("message {id}")))
            }
            DeleteMode::SelfOnly => {
                if !existing.is_participant(requester) {
                    return Err(StoreError::Forbidden(
                        "not a participant of this conversation".into(),
                    ));
                }

                // Set-union in a single statement; a repeated call matches no row.
                sqlx::query(
                    r#"
                    UPDATE messages
                    SET deleted_by = array_append(deleted_by, $2)
                    WHERE id = $1 AND NOT ($2 = ANY(deleted_by))
                    "#,
                )
                .bind(id.0)
                .bind(requester.user_id.0)
                .execute(&self.pool)
                .await?;

                Ok(existing)
            }
        }
    }

    async fn mark_read(
        &self,
        ids: &[MessageId],
        reader: &Requester,
    ) -> StoreResult<Vec<ReadUpdate>> {
        let raw_ids: Vec<i64> = ids.iter().map(|id| id.0).collect();

        let rows: Vec<(i64, i64, i64)> = sqlx::query_as(
            r#"
            UPDATE messages
            SET is_read = TRUE, read_at = NOW()
            WHERE id = ANY($1) AND is_read = FALSE
              AND author_user_id <> $2
              AND ($3 OR client_id = $2)
            RETURNING id, author_user_id, client_id
            "#,
        )
        .bind(&raw_ids)
        .bind(reader.user_id.0)
        .bind(reader.role.is_admin())
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(reader = %reader.user_id, requested = ids.len(), updated = rows.len(), "Marked messages read");

        let mut updates: Vec<ReadUpdate> = rows
            .into_iter()
            .map(|(id, author, client)| ReadUpdate {
                id: MessageId(id),
                author_user_id: UserId(author),
                client_id: UserId(client),
            })
            .collect();
        updates.sort_by_key(|u| u.id);
        Ok(updates)
    }

    async fn count_unread(&self, user_id: UserId, role: Role) -> StoreResult<UnreadSummary> {
        let wanted_sender = SenderType::from(role).opposite();

        let rows: Vec<(i64, i64)> = match role {
            Role::Client => {
                sqlx::query_as(
                    r#"
                    SELECT client_id, COUNT(*)
                    FROM messages
                    WHERE client_id = $1 AND is_read = FALSE AND sender_type = $2
                      AND NOT ($1 = ANY(deleted_by))
                    GROUP BY client_id
                    "#,
                )
                .bind(user_id.0)
                .bind(wanted_sender)
                .fetch_all(&self.pool)
                .await?
            }
            Role::Admin => {
                sqlx::query_as(
                    r#"
                    SELECT client_id, COUNT(*)
                    FROM messages
                    WHERE is_read = FALSE AND sender_type = $2
                      AND NOT ($1 = ANY(deleted_by))
                    GROUP BY client_id
                    ORDER BY client_id
                    "#,
                )
                .bind(user_id.0)
                .bind(wanted_sender)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let unread_by_client: Vec<ClientUnread> = rows
            .into_iter()
            .map(|(client_id, count)| ClientUnread {
                client_id: UserId(client_id),
                count,
            })
            .collect();

        Ok(UnreadSummary {
            unread_count: unread_by_client.iter().map(|c| c.count).sum(),
            unread_by_client,
        })
    }

    async fn get_client(&self, id: UserId) -> StoreResult<Option<Client>> {
        let row: Option<ClientRow> =
            sqlx::query_as(&format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Into::into))
    }

    async fn list_clients(&self) -> StoreResult<Vec<Client>> {
        let rows: Vec<ClientRow> = sqlx::query_as(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients ORDER BY name ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_client(&self, id: UserId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("client {id}")));
        }
        Ok(())
    }

    async fn add_push_subscription(&self, new: NewPushSubscription) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO push_subscriptions (endpoint, p256dh, auth, client_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (endpoint) DO NOTHING
            "#,
        )
        .bind(&new.endpoint)
        .bind(&new.keys.p256dh)
        .bind(&new.keys.auth)
        .bind(new.client_id.0)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            // Foreign key violation: the client does not exist
            let unknown_client = matches!(
                &e,
                sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23503")
            );
            if unknown_client {
                StoreError::NotFound(format!("client {}", new.client_id))
            } else {
                StoreError::from(e)
            }
        })?;

        Ok(result.rows_affected() > 0)
    }

    async fn push_subscriptions_for(&self, client_id: UserId) -> StoreResult<Vec<PushSubscription>> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT id, endpoint, p256dh, auth, client_id, created_at
            FROM push_subscriptions
            WHERE client_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(client_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations};

    async fn store() -> PgMessageStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let pool = create_pool(&url, 2).await.expect("Failed to create pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        PgMessageStore::new(pool)
    }

    fn unique_id() -> i64 {
        OffsetDateTime::now_utc().unix_timestamp_nanos() as i64 % 1_000_000_000_000
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_soft_delete_is_a_set_union() {
        let store = store().await;
        let client = unique_id();
        let (message, _) = store
            .create_message(
                NewMessage {
                    content: "Hello".into(),
                    kind: MessageKind::Text,
                    sender_type: SenderType::Client,
                    author_user_id: UserId(client),
                    client_id: UserId(client),
                },
                None,
            )
            .await
            .unwrap();

        let admin = Requester::admin(1);
        let (a, b) = tokio::join!(
            store.delete_message(message.id, &admin, DeleteMode::SelfOnly),
            store.delete_message(message.id, &admin, DeleteMode::SelfOnly),
        );
        a.unwrap();
        b.unwrap();

        let stored = store.get_message(message.id).await.unwrap().unwrap();
        assert_eq!(stored.deleted_by, vec![UserId(1)]);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_mark_read_reports_changed_rows_only() {
        let store = store().await;
        let client = unique_id();
        let (message, _) = store
            .create_message(
                NewMessage {
                    content: "Hi".into(),
                    kind: MessageKind::Text,
                    sender_type: SenderType::Admin,
                    author_user_id: UserId(1),
                    client_id: UserId(client),
                },
                None,
            )
            .await
            .unwrap();

        let outsider = store
            .mark_read(&[message.id], &Requester::client(client + 1))
            .await
            .unwrap();
        assert!(outsider.is_empty());

        let reader = Requester::client(client);
        let first = store.mark_read(&[message.id], &reader).await.unwrap();
        let second = store.mark_read(&[message.id], &reader).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_client_row_completed_on_own_contact() {
        let store = store().await;
        let client = unique_id();

        let first = store.ensure_client(UserId(client), UserId(1), None).await.unwrap();
        assert_eq!(first.name, DEFAULT_CLIENT_NAME);
        assert_eq!(first.email, None);

        let profile = AuthorProfile {
            name: Some("Ana".into()),
            email: Some("ana@example.com".into()),
        };
        let completed = store
            .ensure_client(UserId(client), UserId(client), Some(&profile))
            .await
            .unwrap();
        assert_eq!(completed.name, "Ana");
        assert_eq!(completed.email.as_deref(), Some("ana@example.com"));
        assert_eq!(completed.owner_user_id, UserId(1));
    }
}
