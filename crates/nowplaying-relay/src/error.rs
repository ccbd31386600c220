//! Error types for the relay.

use crate::connection::SendError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nowplaying_core::{EnvelopeError, SecretError};
use std::path::PathBuf;

/// Failures local to one connection's receive loop. Logged, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] EnvelopeError),
    #[error(transparent)]
    Send(#[from] SendError),
}

/// Failures surfaced to command bridge callers.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Action '{0}' is not allowed")]
    ActionNotAllowed(String),
    #[error("Bot is not connected")]
    Unavailable,
    #[error("{0}")]
    ForwardFailed(String),
}

impl BridgeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BridgeError::Unauthorized => StatusCode::UNAUTHORIZED,
            BridgeError::ActionNotAllowed(_) => StatusCode::FORBIDDEN,
            BridgeError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            BridgeError::ForwardFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.to_string(),
            "status": "failed",
        });
        (self.status_code(), Json(body)).into_response()
    }
}

/// Invalid or unreadable configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid api_secret: {0}")]
    Secret(#[from] SecretError),
    #[error("invalid allowed origin: {0}")]
    Origin(String),
}
