//! Client error types.

use carpc_protocol::{DispatchError, ErrorCode, ProtocolError};
use thiserror::Error;

/// Client errors.
///
/// Stubs hand these to callers wrapped in `AuthorityError::Rpc`, so the
/// operation name is always available alongside the cause.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("request timeout")]
    Timeout,

    #[error("{0}")]
    Dispatch(#[from] DispatchError),

    /// The far side reported success but sent no payload for an operation
    /// that always produces one.
    #[error("{method}: dispatch returned an empty response")]
    EmptyResponse { method: &'static str },

    #[error("{method}: failed to decode response: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: ProtocolError,
    },

    #[error("{method}: failed to encode request: {source}")]
    Encode {
        method: &'static str,
        #[source]
        source: ProtocolError,
    },
}

impl ClientError {
    /// Returns the error code the server answered with, if any.
    pub fn remote_code(&self) -> Option<ErrorCode> {
        match self {
            ClientError::Dispatch(e) => e.code(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carpc_protocol::RpcError;

    #[test]
    fn test_messages_name_the_operation() {
        let err = ClientError::EmptyResponse {
            method: "IssueCertificate",
        };
        assert_eq!(
            err.to_string(),
            "IssueCertificate: dispatch returned an empty response"
        );

        let err = ClientError::Decode {
            method: "AlreadyDeniedCSR",
            source: ProtocolError::InvalidFlag(2),
        };
        assert!(err.to_string().starts_with("AlreadyDeniedCSR: failed to decode"));
    }

    #[test]
    fn test_remote_code() {
        let err = ClientError::from(DispatchError::Remote(RpcError::improper_message("bad")));
        assert_eq!(err.remote_code(), Some(ErrorCode::ImproperMessage));
        assert_eq!(ClientError::Timeout.remote_code(), None);
    }
}
