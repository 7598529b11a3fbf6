//! Presence notifier: turn registry online/offline transitions into a
//! durable flag write and a broadcast to everyone.

use std::sync::Arc;

use tracing::{info, warn};

use crate::db::UserPresenceStore;
use crate::models::event::{PresenceChange, ServerEvent};
use crate::models::ids::UserId;
use crate::registry::ConnectionRegistry;

/// Publishes presence transitions. The durable flag is advisory: a failed
/// store write is logged and never suppresses the broadcast.
///
/// Transition counts are exact (one online per empty-to-nonempty, one
/// offline per nonempty-to-empty), but broadcasts from different sessions
/// are not ordered relative to each other: a quick reconnect can publish
/// its `user-online` before the stale session's `user-offline` goes out.
/// Clients treat presence as last-write-wins against their own roster.
#[derive(Clone)]
pub struct PresenceNotifier {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn UserPresenceStore>,
}

impl PresenceNotifier {
    pub fn new(registry: Arc<ConnectionRegistry>, store: Arc<dyn UserPresenceStore>) -> Self {
        Self { registry, store }
    }

    /// Called when a user's first connection registers.
    pub async fn user_online(&self, user_id: UserId) {
        self.transition(user_id, true).await;
    }

    /// Called when a user's last connection deregisters.
    pub async fn user_offline(&self, user_id: UserId) {
        self.transition(user_id, false).await;
    }

    async fn transition(&self, user_id: UserId, online: bool) {
        if let Err(e) = self.store.set_online(user_id, online).await {
            warn!(user_id = %user_id, online, error = %e, "presence store update failed");
        }

        let event = if online {
            ServerEvent::UserOnline {
                data: PresenceChange { user_id },
            }
        } else {
            ServerEvent::UserOffline {
                data: PresenceChange { user_id },
            }
        };
        match event.to_json() {
            Ok(payload) => {
                self.registry.broadcast_all(&payload).await;
                info!(user_id = %user_id, online, "presence broadcast");
            }
            Err(e) => warn!(user_id = %user_id, error = %e, "presence event serialization failed"),
        }
    }
}
