//! Message fan-out engine: authorize, persist, then broadcast the confirmed
//! record to the room's current subscribers.
//!
//! Broadcast strictly follows successful persistence and always carries the
//! server-assigned id and timestamp. Delivery is best-effort, at-most-once
//! per currently subscribed connection; anyone not joined catches up through
//! a history fetch on their next join. Sends into the same room are
//! sequenced, so subscribers see messages in persistence commit order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::db::{GroupDirectory, MessageStore, StoredMessage};
use crate::error::{AppError, AppResult};
use crate::models::event::{GroupMessage, PrivateMessage, ServerEvent};
use crate::models::ids::{GroupId, RoomId, UserId};
use crate::registry::{ConnectionRegistry, RoomRouter};

const MAX_BODY_BYTES: usize = 8 * 1024;

/// Per-room locks covering the persist-then-broadcast window. Holding a
/// room's slot across both steps keeps broadcast order equal to commit
/// order; different rooms never wait on each other.
#[derive(Default)]
struct RoomSequencer {
    slots: Mutex<HashMap<RoomId, Arc<Mutex<()>>>>,
}

impl RoomSequencer {
    async fn slot(&self, room_id: &RoomId) -> Arc<Mutex<()>> {
        self.slots
            .lock()
            .await
            .entry(room_id.clone())
            .or_default()
            .clone()
    }

    /// Prune the slot once no send holds or waits on it.
    async fn release(&self, room_id: &RoomId) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get(room_id) {
            if Arc::strong_count(slot) == 1 {
                slots.remove(room_id);
            }
        }
    }
}

/// Routes confirmed messages to live room subscribers.
#[derive(Clone)]
pub struct FanoutEngine {
    registry: Arc<ConnectionRegistry>,
    router: Arc<RoomRouter>,
    messages: Arc<dyn MessageStore>,
    groups: Arc<dyn GroupDirectory>,
    sequencer: Arc<RoomSequencer>,
    persist_timeout: Duration,
}

impl FanoutEngine {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        router: Arc<RoomRouter>,
        messages: Arc<dyn MessageStore>,
        groups: Arc<dyn GroupDirectory>,
        persist_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            router,
            messages,
            groups,
            sequencer: Arc::default(),
            persist_timeout,
        }
    }

    /// Send a private message. Persists first; on success, broadcasts to all
    /// connections currently in the pair room, including the sender's other
    /// tabs. Joining only affects receiving, never sending.
    pub async fn send_private(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        body: &str,
    ) -> AppResult<PrivateMessage> {
        let body = validate_body(body)?;
        let room_id = RoomId::private(sender_id, receiver_id);

        let slot = self.sequencer.slot(&room_id).await;
        let result = async {
            let _guard = slot.lock().await;
            let stored = self
                .persist(self.messages.persist_private(sender_id, receiver_id, body))
                .await?;

            let message = PrivateMessage {
                id: stored.id,
                room_id: room_id.clone(),
                sender_id,
                receiver_id,
                body: body.to_string(),
                timestamp: stored.timestamp,
            };
            let payload = ServerEvent::NewMessage {
                data: message.clone(),
            }
            .to_json()?;
            self.broadcast(&room_id, &payload).await;
            Ok(message)
        }
        .await;
        drop(slot);
        self.sequencer.release(&room_id).await;
        result
    }

    /// Send a group message. The sender must be a current group member;
    /// otherwise nothing is persisted or broadcast.
    pub async fn send_group(
        &self,
        sender_id: UserId,
        group_id: GroupId,
        body: &str,
    ) -> AppResult<GroupMessage> {
        let body = validate_body(body)?;
        if !self.groups.is_member(sender_id, group_id).await? {
            return Err(AppError::Forbidden(
                "sender is not a member of this group".to_string(),
            ));
        }

        let room_id = RoomId::group(group_id);
        let slot = self.sequencer.slot(&room_id).await;
        let result = async {
            let _guard = slot.lock().await;
            let stored = self
                .persist(self.messages.persist_group(sender_id, group_id, body))
                .await?;

            let message = GroupMessage {
                id: stored.id,
                group_id,
                sender_id,
                body: body.to_string(),
                timestamp: stored.timestamp,
            };
            let payload = ServerEvent::NewGroupMessage {
                data: message.clone(),
            }
            .to_json()?;
            self.broadcast(&room_id, &payload).await;
            Ok(message)
        }
        .await;
        drop(slot);
        self.sequencer.release(&room_id).await;
        result
    }

    async fn persist<F>(&self, fut: F) -> AppResult<StoredMessage>
    where
        F: Future<Output = AppResult<StoredMessage>>,
    {
        match tokio::time::timeout(self.persist_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Storage("message store timed out".to_string())),
        }
    }

    async fn broadcast(&self, room_id: &RoomId, payload: &str) {
        let members = self.router.members_of(room_id).await;
        if members.is_empty() {
            debug!(room_id = %room_id, "no subscribers; message persisted only");
            return;
        }
        let count = members.len();
        self.registry.send_to_many(&members, payload).await;
        info!(room_id = %room_id, count, "message fanned out");
    }
}

fn validate_body(body: &str) -> AppResult<&str> {
    let body = body.trim();
    if body.is_empty() {
        return Err(AppError::Protocol("message body is empty".to_string()));
    }
    if body.len() > MAX_BODY_BYTES {
        return Err(AppError::Protocol("message body too large".to_string()));
    }
    Ok(body)
}
