//! Connection registry: which users are connected, and how to reach each
//! live connection. The presence source of truth.
//!
//! A user appears in the map iff they have at least one live connection.
//! The empty-set transitions are the only presence triggers, so multiple
//! tabs for the same user cannot flap online/offline.

use std::collections::{HashMap, HashSet};

use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::models::ids::{ConnectionId, UserId};

/// Outbound path for one connection. Pushes are non-blocking; the session's
/// forwarding task drains them onto the socket.
pub type OutboundSender = mpsc::UnboundedSender<String>;

#[derive(Default)]
struct Inner {
    users: HashMap<UserId, HashSet<ConnectionId>>,
    senders: HashMap<ConnectionId, OutboundSender>,
}

/// Tracks live connections per user. All mutation goes through `register` /
/// `deregister`; nothing else touches the maps.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection for `user_id`. Returns `true` iff this is the
    /// user's first live connection (the online transition).
    pub async fn register(
        &self,
        user_id: UserId,
        conn_id: ConnectionId,
        sender: OutboundSender,
    ) -> bool {
        let mut inner = self.inner.write().await;
        inner.senders.insert(conn_id.clone(), sender);
        let conns = inner.users.entry(user_id).or_default();
        let became_online = conns.is_empty();
        conns.insert(conn_id);
        became_online
    }

    /// Drop a connection. Returns `true` iff this was the user's last live
    /// connection (the offline transition); the user's entry is deleted.
    /// Idempotent: unknown ids are a no-op returning `false`.
    pub async fn deregister(&self, user_id: UserId, conn_id: &ConnectionId) -> bool {
        let mut inner = self.inner.write().await;
        inner.senders.remove(conn_id);
        let emptied = match inner.users.get_mut(&user_id) {
            Some(conns) => conns.remove(conn_id) && conns.is_empty(),
            None => false,
        };
        if emptied {
            inner.users.remove(&user_id);
        }
        emptied
    }

    pub async fn is_online(&self, user_id: UserId) -> bool {
        self.inner.read().await.users.contains_key(&user_id)
    }

    pub async fn connections_of(&self, user_id: UserId) -> HashSet<ConnectionId> {
        self.inner
            .read()
            .await
            .users
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn online_users(&self) -> Vec<UserId> {
        self.inner.read().await.users.keys().copied().collect()
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.senders.len()
    }

    /// Deliver a payload to one connection. Dead receivers are ignored; the
    /// session cleanup deregisters them.
    pub async fn send_to(&self, conn_id: &ConnectionId, payload: String) {
        if let Some(tx) = self.inner.read().await.senders.get(conn_id) {
            if tx.send(payload).is_err() {
                debug!(conn_id = %conn_id, "dropping payload for closed connection");
            }
        }
    }

    /// Deliver a payload to a set of connections (room fan-out).
    pub async fn send_to_many<'a, I>(&self, conn_ids: I, payload: &str)
    where
        I: IntoIterator<Item = &'a ConnectionId>,
    {
        let inner = self.inner.read().await;
        for conn_id in conn_ids {
            if let Some(tx) = inner.senders.get(conn_id) {
                let _ = tx.send(payload.to_string());
            }
        }
    }

    /// Deliver a payload to every live connection (presence broadcasts).
    pub async fn broadcast_all(&self, payload: &str) {
        let inner = self.inner.read().await;
        for tx in inner.senders.values() {
            let _ = tx.send(payload.to_string());
        }
    }
}
