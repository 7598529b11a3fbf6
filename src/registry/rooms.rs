//! Room membership router: which connections receive a conversation's
//! messages right now.
//!
//! Membership is implicit and ephemeral. Entries appear on first join and
//! are pruned on last leave; nothing survives a restart (clients re-join on
//! reconnect). A reverse index keeps disconnect cleanup proportional to the
//! rooms that connection had joined. The router never authorizes — group
//! membership is checked by the caller before a join is honored.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use crate::models::ids::{ConnectionId, RoomId};

#[derive(Default)]
struct Inner {
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
    joined: HashMap<ConnectionId, HashSet<RoomId>>,
}

/// Maps room ids to subscribed connections, with a reverse index for
/// O(rooms-of-connection) cleanup.
#[derive(Default)]
pub struct RoomRouter {
    inner: RwLock<Inner>,
}

impl RoomRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection to a room. Idempotent.
    pub async fn join(&self, conn_id: &ConnectionId, room_id: RoomId) {
        let mut inner = self.inner.write().await;
        inner
            .rooms
            .entry(room_id.clone())
            .or_default()
            .insert(conn_id.clone());
        inner
            .joined
            .entry(conn_id.clone())
            .or_default()
            .insert(room_id);
    }

    /// Unsubscribe a connection from a room. Idempotent; an emptied room is
    /// pruned.
    pub async fn leave(&self, conn_id: &ConnectionId, room_id: &RoomId) {
        let mut inner = self.inner.write().await;
        let room_emptied = inner
            .rooms
            .get_mut(room_id)
            .map(|members| {
                members.remove(conn_id);
                members.is_empty()
            })
            .unwrap_or(false);
        if room_emptied {
            inner.rooms.remove(room_id);
        }
        let conn_emptied = inner
            .joined
            .get_mut(conn_id)
            .map(|rooms| {
                rooms.remove(room_id);
                rooms.is_empty()
            })
            .unwrap_or(false);
        if conn_emptied {
            inner.joined.remove(conn_id);
        }
    }

    /// Remove a connection from every room it had joined. Called on
    /// disconnect, before the connection registry deregisters it.
    pub async fn leave_all(&self, conn_id: &ConnectionId) {
        let mut inner = self.inner.write().await;
        let Some(rooms) = inner.joined.remove(conn_id) else {
            return;
        };
        for room_id in rooms {
            let emptied = inner
                .rooms
                .get_mut(&room_id)
                .map(|members| {
                    members.remove(conn_id);
                    members.is_empty()
                })
                .unwrap_or(false);
            if emptied {
                inner.rooms.remove(&room_id);
            }
        }
    }

    /// Connections currently subscribed to a room. Empty if the room has no
    /// subscribers (which is the same as the room not existing).
    pub async fn members_of(&self, room_id: &RoomId) -> HashSet<ConnectionId> {
        self.inner
            .read()
            .await
            .rooms
            .get(room_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn rooms_of(&self, conn_id: &ConnectionId) -> HashSet<RoomId> {
        self.inner
            .read()
            .await
            .joined
            .get(conn_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }
}
