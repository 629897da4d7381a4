//! Domain error types.

use thiserror::Error;

/// Result type returned by every authority operation.
pub type AuthorityResult<T> = Result<T, AuthorityError>;

/// Errors returned by authority implementations and by their remote stubs.
#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// A remote call failed before a domain answer was obtained.
    #[error("{method} RPC failed: {source}")]
    Rpc {
        method: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl AuthorityError {
    /// Returns whether this error means the requested record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AuthorityError::NotFound(_))
    }

    /// Returns the message without the variant prefix.
    ///
    /// Re-wrapping the detail in the same variant reproduces the original
    /// `Display` output, which is what keeps errors identical on both sides
    /// of an RPC boundary.
    pub fn detail(&self) -> String {
        match self {
            AuthorityError::NotFound(m)
            | AuthorityError::Malformed(m)
            | AuthorityError::Unauthorized(m)
            | AuthorityError::RateLimited(m)
            | AuthorityError::NotSupported(m)
            | AuthorityError::Internal(m) => m.clone(),
            AuthorityError::Rpc { .. } => self.to_string(),
        }
    }

    /// Wraps a stub-side failure for `method`.
    pub fn rpc(
        method: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        AuthorityError::Rpc {
            method,
            source: source.into(),
        }
    }
}
