//! Certificate Authority stub.

use super::Caller;
use crate::error::ClientError;
use carpc_core::der::Encode;
use carpc_core::{
    AuthorityError, AuthorityResult, CertReq, Certificate, CertificateAuthority,
    OcspSigningRequest,
};
use carpc_protocol::envelope::{IssueCertificateRequest, RevokeCertificateRequest};
use carpc_protocol::{ClientEndpoint, Method, ProtocolError, Role};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// [`CertificateAuthority`] backed by a remote CA.
#[derive(Clone)]
pub struct CertificateAuthorityClient {
    caller: Caller,
}

impl CertificateAuthorityClient {
    pub fn new(endpoint: Arc<dyn ClientEndpoint>) -> Self {
        Self {
            caller: Caller::new(endpoint, Role::Ca),
        }
    }
}

impl CertificateAuthority for CertificateAuthorityClient {
    fn issue_certificate(
        &self,
        csr: &CertReq,
        reg_id: i64,
        earliest_expiry: DateTime<Utc>,
    ) -> AuthorityResult<Certificate> {
        let method = Method::IssueCertificate;
        let csr = csr.to_der().map_err(|e| {
            AuthorityError::rpc(
                method.as_str(),
                ClientError::Encode {
                    method: method.as_str(),
                    source: ProtocolError::Der(e),
                },
            )
        })?;
        self.caller.call(
            method,
            &IssueCertificateRequest {
                csr,
                reg_id,
                earliest_expiry,
            },
        )
    }

    fn revoke_certificate(&self, serial: &str, reason_code: i32) -> AuthorityResult<()> {
        self.caller.call(
            Method::RevokeCertificate,
            &RevokeCertificateRequest {
                serial: serial.to_string(),
                reason_code,
            },
        )
    }

    fn generate_ocsp(&self, req: OcspSigningRequest) -> AuthorityResult<Vec<u8>> {
        self.caller.call(Method::GenerateOcsp, &req)
    }
}
