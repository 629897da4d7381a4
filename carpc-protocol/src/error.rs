//! Protocol error types and wire error codes.

use crate::catalog::Encoding;
use carpc_core::AuthorityError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised while framing, encoding or routing a call.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid magic bytes: expected 'CARP', got {0:?}")]
    InvalidMagic([u8; 4]),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("operation name too long: {0} bytes")]
    MethodTooLong(usize),

    #[error("CRC mismatch: expected {expected:#x}, got {actual:#x}")]
    CrcMismatch { expected: u32, actual: u32 },

    #[error("invalid frame flags: {0:#x}")]
    InvalidFlags(u16),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("DER error: {0}")]
    Der(#[from] carpc_core::der::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,

    #[error("flag payload must be exactly one byte, got {0}")]
    InvalidFlag(usize),

    #[error("{method} expects a {expected} payload, value encodes as {actual}")]
    EncodingMismatch {
        method: String,
        expected: Encoding,
        actual: Encoding,
    },

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("handler already registered for {0}")]
    DuplicateHandler(String),
}

/// Stable error codes carried in error replies.
///
/// These codes are part of the wire contract and must remain stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Protocol errors
    ImproperMessage,
    UnknownOperation,
    /// The handler succeeded but its result could not be put on the wire.
    EncodeFailed,

    // Domain errors
    NotFound,
    Malformed,
    Unauthorized,
    RateLimited,
    NotSupported,

    // System errors
    InternalError,
}

impl ErrorCode {
    /// Returns the code a domain failure travels under.
    pub fn for_authority(err: &AuthorityError) -> Self {
        match err {
            AuthorityError::NotFound(_) => ErrorCode::NotFound,
            AuthorityError::Malformed(_) => ErrorCode::Malformed,
            AuthorityError::Unauthorized(_) => ErrorCode::Unauthorized,
            AuthorityError::RateLimited(_) => ErrorCode::RateLimited,
            AuthorityError::NotSupported(_) => ErrorCode::NotSupported,
            AuthorityError::Internal(_) | AuthorityError::Rpc { .. } => ErrorCode::InternalError,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::ImproperMessage => write!(f, "IMPROPER_MESSAGE"),
            ErrorCode::UnknownOperation => write!(f, "UNKNOWN_OPERATION"),
            ErrorCode::EncodeFailed => write!(f, "ENCODE_FAILED"),
            ErrorCode::NotFound => write!(f, "NOT_FOUND"),
            ErrorCode::Malformed => write!(f, "MALFORMED"),
            ErrorCode::Unauthorized => write!(f, "UNAUTHORIZED"),
            ErrorCode::RateLimited => write!(f, "RATE_LIMITED"),
            ErrorCode::NotSupported => write!(f, "NOT_SUPPORTED"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
        }
    }
}

/// A failed call as seen by the transport: what a handler returns and what
/// the caller receives back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn improper_message(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ImproperMessage, message)
    }

    pub fn unknown_operation(method: &str) -> Self {
        Self::new(
            ErrorCode::UnknownOperation,
            format!("unknown operation: {method}"),
        )
    }

    /// Builds the reply for a domain failure.
    pub fn from_authority(err: &AuthorityError) -> Self {
        Self::new(ErrorCode::for_authority(err), err.detail())
    }

    /// Rebuilds the typed domain error this reply was produced from.
    ///
    /// Returns `None` for protocol-level codes, which have no domain
    /// counterpart.
    pub fn to_authority(&self) -> Option<AuthorityError> {
        let message = self.message.clone();
        match self.code {
            ErrorCode::NotFound => Some(AuthorityError::NotFound(message)),
            ErrorCode::Malformed => Some(AuthorityError::Malformed(message)),
            ErrorCode::Unauthorized => Some(AuthorityError::Unauthorized(message)),
            ErrorCode::RateLimited => Some(AuthorityError::RateLimited(message)),
            ErrorCode::NotSupported => Some(AuthorityError::NotSupported(message)),
            ErrorCode::InternalError => Some(AuthorityError::Internal(message)),
            ErrorCode::ImproperMessage
            | ErrorCode::UnknownOperation
            | ErrorCode::EncodeFailed => None,
        }
    }
}

/// Failure of a single `dispatch_sync` round trip.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The handler ran (or routing failed) and answered with an error.
    #[error("remote error: {0}")]
    Remote(#[from] RpcError),

    /// The channel itself failed.
    #[error("transport failure: {source}")]
    Transport {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl DispatchError {
    pub fn transport(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        DispatchError::Transport {
            source: source.into(),
        }
    }

    /// Returns the remote error code, if the failure came from the far side.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            DispatchError::Remote(err) => Some(err.code),
            DispatchError::Transport { .. } => None,
        }
    }
}
