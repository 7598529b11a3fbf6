//! HTTP handlers: shared state and health.

use axum::{extract::State, http::StatusCode, Json};
use serde_json::json;
use std::sync::Arc;

use crate::auth::JwtSecret;
use crate::db::GroupDirectory;
use crate::registry::{ConnectionRegistry, RoomRouter};
use crate::services::{FanoutEngine, PresenceNotifier};

/// Shared application state for the WebSocket and HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub router: Arc<RoomRouter>,
    pub fanout: FanoutEngine,
    pub presence: PresenceNotifier,
    pub groups: Arc<dyn GroupDirectory>,
    pub jwt_secret: JwtSecret,
}

impl AppState {
    pub fn jwt_secret(&self) -> &JwtSecret {
        &self.jwt_secret
    }
}

/// GET /health — liveness probe with live gauge counts.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let online_users = state.registry.online_users().await.len();
    let connections = state.registry.connection_count().await;
    let rooms = state.router.room_count().await;
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "chatsock",
            "online_users": online_users,
            "connections": connections,
            "rooms": rooms
        })),
    )
}
