//! Storage Authority stub.

use super::Caller;
use carpc_core::{
    AuthorityResult, Authorization, CertificateStatus, JsonWebKey, Registration,
    StorageAuthority,
};
use carpc_protocol::envelope::{
    AddCertificateRequest, DeniedCsrRequest, MarkCertificateRevokedRequest, RegistrationIdRequest,
};
use carpc_protocol::{ClientEndpoint, Method, Role};
use std::sync::Arc;

/// [`StorageAuthority`] backed by a remote SA.
#[derive(Clone)]
pub struct StorageAuthorityClient {
    caller: Caller,
}

impl StorageAuthorityClient {
    pub fn new(endpoint: Arc<dyn ClientEndpoint>) -> Self {
        Self {
            caller: Caller::new(endpoint, Role::Sa),
        }
    }
}

impl StorageAuthority for StorageAuthorityClient {
    fn get_registration(&self, id: i64) -> AuthorityResult<Registration> {
        self.caller
            .call(Method::GetRegistration, &RegistrationIdRequest { id })
    }

    fn get_registration_by_key(&self, key: &JsonWebKey) -> AuthorityResult<Registration> {
        self.caller.call(Method::GetRegistrationByKey, key)
    }

    fn get_authorization(&self, id: &str) -> AuthorityResult<Authorization> {
        self.caller.call(Method::GetAuthorization, &id.to_string())
    }

    fn get_certificate(&self, serial: &str) -> AuthorityResult<Vec<u8>> {
        self.caller.call(Method::GetCertificate, &serial.to_string())
    }

    fn get_certificate_by_short_serial(&self, short_serial: &str) -> AuthorityResult<Vec<u8>> {
        self.caller
            .call(Method::GetCertificateByShortSerial, &short_serial.to_string())
    }

    fn get_certificate_status(&self, serial: &str) -> AuthorityResult<CertificateStatus> {
        self.caller
            .call(Method::GetCertificateStatus, &serial.to_string())
    }

    fn new_registration(&self, reg: Registration) -> AuthorityResult<Registration> {
        self.caller.call(Method::NewRegistration, &reg)
    }

    fn update_registration(&self, reg: Registration) -> AuthorityResult<()> {
        self.caller.call(Method::UpdateRegistration, &reg)
    }

    fn new_pending_authorization(&self, authz: Authorization) -> AuthorityResult<Authorization> {
        self.caller.call(Method::NewPendingAuthorization, &authz)
    }

    fn update_pending_authorization(&self, authz: Authorization) -> AuthorityResult<()> {
        self.caller.call(Method::UpdatePendingAuthorization, &authz)
    }

    fn finalize_authorization(&self, authz: Authorization) -> AuthorityResult<()> {
        self.caller.call(Method::FinalizeAuthorization, &authz)
    }

    fn mark_certificate_revoked(
        &self,
        serial: &str,
        ocsp_response: &[u8],
        reason_code: i32,
    ) -> AuthorityResult<()> {
        self.caller.call(
            Method::MarkCertificateRevoked,
            &MarkCertificateRevokedRequest {
                serial: serial.to_string(),
                ocsp_response: ocsp_response.to_vec(),
                reason_code,
            },
        )
    }

    fn add_certificate(&self, der: &[u8], reg_id: i64) -> AuthorityResult<String> {
        self.caller.call(
            Method::AddCertificate,
            &AddCertificateRequest {
                der: der.to_vec(),
                reg_id,
            },
        )
    }

    fn already_denied_csr(&self, names: &[String]) -> AuthorityResult<bool> {
        self.caller.call(
            Method::AlreadyDeniedCsr,
            &DeniedCsrRequest {
                names: names.to_vec(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::client_error;
    use crate::stub::testing::CannedEndpoint;
    use crate::ClientError;

    fn names() -> Vec<String> {
        vec!["example.com".to_string()]
    }

    #[test]
    fn test_already_denied_byte_values() {
        for (byte, expected) in [(0u8, false), (1, true), (2, true), (0xff, true)] {
            let sa = StorageAuthorityClient::new(Arc::new(CannedEndpoint::replying(&[byte])));
            assert_eq!(sa.already_denied_csr(&names()).unwrap(), expected);
        }
    }

    #[test]
    fn test_already_denied_empty_reply() {
        let sa = StorageAuthorityClient::new(Arc::new(CannedEndpoint::replying(&[])));
        let err = sa.already_denied_csr(&names()).unwrap_err();
        assert!(matches!(
            client_error(&err),
            Some(ClientError::EmptyResponse {
                method: "AlreadyDeniedCSR"
            })
        ));
    }

    #[test]
    fn test_already_denied_long_reply() {
        let sa = StorageAuthorityClient::new(Arc::new(CannedEndpoint::replying(&[0, 1])));
        let err = sa.already_denied_csr(&names()).unwrap_err();
        assert!(matches!(
            client_error(&err),
            Some(ClientError::Decode { .. })
        ));
    }

    #[test]
    fn test_add_certificate_empty_reply() {
        let sa = StorageAuthorityClient::new(Arc::new(CannedEndpoint::replying(&[])));
        let err = sa.add_certificate(&[0x30], 1).unwrap_err();
        assert!(matches!(
            client_error(&err),
            Some(ClientError::EmptyResponse {
                method: "AddCertificate"
            })
        ));
    }

    #[test]
    fn test_identifiers_travel_raw() {
        let endpoint = Arc::new(CannedEndpoint::replying(&[0x30, 0x00]));
        let sa = StorageAuthorityClient::new(endpoint.clone());

        let der = sa.get_certificate_by_short_serial("0a1b").unwrap();
        assert_eq!(der, vec![0x30, 0x00]);
        assert_eq!(endpoint.last_payload(), b"0a1b".to_vec());
    }

    #[test]
    fn test_get_registration_request_shape() {
        let endpoint = Arc::new(CannedEndpoint::replying(&[]));
        let sa = StorageAuthorityClient::new(endpoint.clone());
        let _ = sa.get_registration(12);
        assert_eq!(endpoint.last_payload(), br#"{"id":12}"#.to_vec());
    }
}
