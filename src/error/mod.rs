//! Application error types for robust error handling.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Bad or missing handshake credential. Rejects the connection; no state mutation.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Sender is not allowed to perform the operation (e.g. not a group member).
    /// Scoped to the one request; nothing is persisted or broadcast.
    #[error("Not authorized: {0}")]
    Forbidden(String),

    /// Message store unavailable or timed out. The send is rejected and
    /// nothing is broadcast; the connection stays active.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Malformed event payload from a client.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Short machine-readable kind, used in `error` events sent to clients.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Db(_) => "storage",
            AppError::Serialization(_) => "protocol",
            AppError::Auth(_) => "auth",
            AppError::Forbidden(_) => "forbidden",
            AppError::Storage(_) => "storage",
            AppError::Protocol(_) => "protocol",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Db(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", e),
            ),
            AppError::Serialization(e) => (
                StatusCode::BAD_REQUEST,
                format!("Invalid payload: {}", e),
            ),
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::Storage(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Protocol(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Internal(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {}", e),
            ),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_taxonomy() {
        assert_eq!(AppError::Auth("x".into()).kind(), "auth");
        assert_eq!(AppError::Forbidden("x".into()).kind(), "forbidden");
        assert_eq!(AppError::Storage("x".into()).kind(), "storage");
        assert_eq!(AppError::Protocol("x".into()).kind(), "protocol");
    }
}
