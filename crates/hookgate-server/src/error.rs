//! Error types for the server.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Server error type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The port is taken, most likely by another instance.
    #[error("port {port} is already in use on {addr}. Is another instance running?")]
    AddressInUse { addr: String, port: u16 },

    /// Binding failed for a reason other than the port being taken.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// TLS key or certificate could not be read or used.
    #[error("TLS setup failed: {0}")]
    Tls(String),

    /// The queue backend stayed unreachable past the downtime threshold.
    #[error("queue backend unreachable beyond the configured threshold")]
    QueueUnavailable,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Service unavailable.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] hookgate_config::ConfigError),
}

impl ServerError {
    /// Errors that must terminate the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ServerError::AddressInUse { .. }
                | ServerError::Bind { .. }
                | ServerError::Tls(_)
                | ServerError::QueueUnavailable
                | ServerError::Config(_)
        )
    }
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    /// Build the JSON response and log it by status class.
    pub(crate) fn respond(status: StatusCode, code: &str, message: String) -> Response {
        if status.is_server_error() {
            tracing::error!(status = %status, code, error = %message, "Server error");
        } else {
            tracing::warn!(status = %status, code, error = %message, "Client error");
        }

        let body = ErrorResponse {
            code: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ServerError::ServiceUnavailable(_) | ServerError::QueueUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            ServerError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            ServerError::AddressInUse { .. }
            | ServerError::Bind { .. }
            | ServerError::Tls(_)
            | ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let message = match &self {
            ServerError::ServiceUnavailable(msg) => msg.clone(),
            other => other.to_string(),
        };

        ErrorResponse::respond(status, code, message)
    }
}
