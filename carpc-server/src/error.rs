//! Server error types.

use crate::config::ConfigError;
use carpc_protocol::{ErrorCode, ProtocolError};
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("server shutting down")]
    ShuttingDown,
}

impl ServerError {
    /// Converts to the wire error code a peer would see for this failure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ServerError::Protocol(ProtocolError::UnknownOperation(_)) => {
                ErrorCode::UnknownOperation
            }
            ServerError::Protocol(_) | ServerError::Json(_) => ErrorCode::ImproperMessage,
            ServerError::Io(_)
            | ServerError::Config(_)
            | ServerError::Metrics(_)
            | ServerError::ShuttingDown => ErrorCode::InternalError,
        }
    }
}
