//! Remote stubs.
//!
//! Each stub implements one authority trait by dispatching over a
//! [`ClientEndpoint`], so callers cannot tell a remote authority from a
//! local one. For every method the stub:
//!
//! 1. encodes the request under the operation's catalog policy
//! 2. dispatches it and waits for the reply
//! 3. turns a remote domain error back into its typed `AuthorityError`
//! 4. rejects an empty success for operations that always answer with a
//!    payload
//! 5. decodes the reply
//!
//! Everything that is not a remote domain error is reported as
//! `AuthorityError::Rpc`, with a [`ClientError`] as its source.

pub mod ca;
pub mod ra;
pub mod sa;
pub mod va;

pub use ca::CertificateAuthorityClient;
pub use ra::RegistrationAuthorityClient;
pub use sa::StorageAuthorityClient;
pub use va::ValidationAuthorityClient;

use crate::error::ClientError;
use carpc_core::{AuthorityError, AuthorityResult};
use carpc_protocol::{ClientEndpoint, Codec, DispatchError, Method, Role, WireFormat};
use std::sync::Arc;

/// Shared call path for the four stubs.
#[derive(Clone)]
pub(crate) struct Caller {
    endpoint: Arc<dyn ClientEndpoint>,
    codec: Codec,
}

impl Caller {
    pub(crate) fn new(endpoint: Arc<dyn ClientEndpoint>, role: Role) -> Self {
        Self {
            endpoint,
            codec: Codec::new(role),
        }
    }

    pub(crate) fn call<Req, Resp>(&self, method: Method, req: &Req) -> AuthorityResult<Resp>
    where
        Req: WireFormat,
        Resp: WireFormat,
    {
        let name = method.as_str();
        let fail = |err: ClientError| AuthorityError::rpc(name, err);

        let spec = self.codec.spec(method).map_err(|source| {
            fail(ClientError::Encode {
                method: name,
                source,
            })
        })?;
        let payload = self.codec.encode_request(method, req).map_err(|source| {
            fail(ClientError::Encode {
                method: name,
                source,
            })
        })?;

        let reply = match self.endpoint.dispatch_sync(name, payload) {
            Ok(reply) => reply,
            Err(DispatchError::Remote(remote)) => {
                tracing::debug!(method = name, code = %remote.code, "Remote error");
                return Err(match remote.to_authority() {
                    Some(err) => err,
                    None => fail(ClientError::Dispatch(DispatchError::Remote(remote))),
                });
            }
            Err(e) => {
                tracing::debug!(method = name, error = %e, "Dispatch failed");
                return Err(fail(ClientError::Dispatch(e)));
            }
        };

        if reply.is_empty() && spec.requires_response() {
            return Err(fail(ClientError::EmptyResponse { method: name }));
        }

        self.codec.decode_response(method, &reply).map_err(|source| {
            fail(ClientError::Decode {
                method: name,
                source,
            })
        })
    }
}

/// Returns the [`ClientError`] behind a stub failure, if there is one.
pub fn client_error(err: &AuthorityError) -> Option<&ClientError> {
    match err {
        AuthorityError::Rpc { source, .. } => source.downcast_ref::<ClientError>(),
        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::CannedEndpoint;
    use super::*;
    use carpc_core::fixtures::sample_registration;
    use carpc_protocol::{ErrorCode, RpcError};

    fn caller(endpoint: CannedEndpoint) -> Caller {
        Caller::new(Arc::new(endpoint), Role::Sa)
    }

    #[test]
    fn test_remote_domain_error_keeps_variant() {
        let caller = caller(CannedEndpoint::new(|| {
            Err(DispatchError::Remote(RpcError::new(
                ErrorCode::NotFound,
                "no rows",
            )))
        }));
        let err = caller
            .call::<String, Vec<u8>>(Method::GetCertificate, &"00ab".to_string())
            .unwrap_err();
        assert!(matches!(err, AuthorityError::NotFound(ref m) if m == "no rows"));
        assert!(client_error(&err).is_none());
    }

    #[test]
    fn test_protocol_error_is_wrapped() {
        let caller = caller(CannedEndpoint::new(|| {
            Err(DispatchError::Remote(RpcError::improper_message("EOF")))
        }));
        let err = caller
            .call::<String, Vec<u8>>(Method::GetCertificate, &"00ab".to_string())
            .unwrap_err();
        assert!(matches!(err, AuthorityError::Rpc { method: "GetCertificate", .. }));
        assert_eq!(
            client_error(&err).and_then(ClientError::remote_code),
            Some(ErrorCode::ImproperMessage)
        );
    }

    #[test]
    fn test_transport_failure_is_wrapped() {
        let caller = caller(CannedEndpoint::new(|| {
            Err(DispatchError::transport("connection reset"))
        }));
        let err = caller
            .call::<String, Vec<u8>>(Method::GetCertificate, &"00ab".to_string())
            .unwrap_err();
        match client_error(&err) {
            Some(ClientError::Dispatch(e)) => {
                assert!(matches!(e, DispatchError::Transport { .. }))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_empty_reply_allowed_for_empty_response() {
        let caller = caller(CannedEndpoint::replying(&[]));
        caller
            .call::<_, ()>(Method::UpdateRegistration, &sample_registration())
            .unwrap();
    }

    #[test]
    fn test_empty_reply_rejected_for_raw_response() {
        let caller = caller(CannedEndpoint::replying(&[]));
        let err = caller
            .call::<String, Vec<u8>>(Method::GetCertificate, &"00ab".to_string())
            .unwrap_err();
        assert!(matches!(
            client_error(&err),
            Some(ClientError::EmptyResponse {
                method: "GetCertificate"
            })
        ));
    }

    #[test]
    fn test_foreign_operation_fails_before_dispatch() {
        let endpoint = Arc::new(CannedEndpoint::replying(&[1]));
        let caller = Caller::new(endpoint.clone(), Role::Va);
        let err = caller
            .call::<String, Vec<u8>>(Method::GetCertificate, &"00ab".to_string())
            .unwrap_err();
        assert!(matches!(
            client_error(&err),
            Some(ClientError::Encode { .. })
        ));
        assert!(endpoint.sent.lock().is_empty());
    }
}
