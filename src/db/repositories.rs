//! External persistence collaborators: message store, group directory, user
//! presence flag. The fan-out core owns none of this data; it writes through
//! and relays the confirmed records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::ids::{GroupId, UserId};

use super::DbPool;

/// Server-assigned identity of a persisted message. Broadcasts carry these,
/// never client-supplied values.
#[derive(Debug, Clone, Copy, FromRow)]
pub struct StoredMessage {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// Durable message storage. A send is broadcast only after one of these
/// calls returns successfully.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn persist_private(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        body: &str,
    ) -> AppResult<StoredMessage>;

    async fn persist_group(
        &self,
        sender_id: UserId,
        group_id: GroupId,
        body: &str,
    ) -> AppResult<StoredMessage>;
}

/// Group membership lookup, checked before group sends and group-room joins.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    async fn is_member(&self, user_id: UserId, group_id: GroupId) -> AppResult<bool>;
}

/// Durable online flag. Best-effort from the core's perspective.
#[async_trait]
pub trait UserPresenceStore: Send + Sync {
    async fn set_online(&self, user_id: UserId, online: bool) -> AppResult<()>;
}

// ---- PostgreSQL implementations ----

/// Message store over the chat application's `chats` / `group_chats` tables.
#[derive(Clone)]
pub struct PgMessageStore {
    pool: DbPool,
}

impl PgMessageStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn persist_private(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        body: &str,
    ) -> AppResult<StoredMessage> {
        let row = sqlx::query_as::<_, StoredMessage>(
            r#"
            INSERT INTO chats (sender_id, receiver_id, body)
            VALUES ($1, $2, $3)
            RETURNING id, created_at AS timestamp
            "#,
        )
        .bind(sender_id.0)
        .bind(receiver_id.0)
        .bind(body)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn persist_group(
        &self,
        sender_id: UserId,
        group_id: GroupId,
        body: &str,
    ) -> AppResult<StoredMessage> {
        let row = sqlx::query_as::<_, StoredMessage>(
            r#"
            INSERT INTO group_chats (group_id, sender_id, body)
            VALUES ($1, $2, $3)
            RETURNING id, created_at AS timestamp
            "#,
        )
        .bind(group_id.0)
        .bind(sender_id.0)
        .bind(body)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }
}

/// Group directory over the `group_members` table.
#[derive(Clone)]
pub struct PgGroupDirectory {
    pool: DbPool,
}

impl PgGroupDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GroupDirectory for PgGroupDirectory {
    async fn is_member(&self, user_id: UserId, group_id: GroupId) -> AppResult<bool> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT user_id FROM group_members WHERE group_id = $1 AND user_id = $2",
        )
        .bind(group_id.0)
        .bind(user_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }
}

/// Presence flag on the `users` table (`is_online`).
#[derive(Clone)]
pub struct PgUserPresenceStore {
    pool: DbPool,
}

impl PgUserPresenceStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserPresenceStore for PgUserPresenceStore {
    async fn set_online(&self, user_id: UserId, online: bool) -> AppResult<()> {
        sqlx::query("UPDATE users SET is_online = $1 WHERE id = $2")
            .bind(online)
            .bind(user_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
