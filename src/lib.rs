//! Real-time chat message fan-out server.
//!
//! Tracks which users are connected, routes sent messages to the live
//! sockets of a private-pair or group room, and keeps an online/offline
//! presence view consistent across multiple sockets per user. Message
//! storage, group membership, and token signing live in external
//! collaborators; this crate owns only the live-connection state.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod registry;
pub mod services;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use handlers::http::AppState;
pub use registry::{ConnectionRegistry, RoomRouter};
pub use services::{FanoutEngine, PresenceNotifier};

use axum::routing::get;
use handlers::http;

/// Build the router (ws upgrade and health). Used by main and by integration tests.
pub fn create_app(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/ws", get(handlers::ws_handler))
        .route("/health", get(http::health))
        .with_state(state)
}
