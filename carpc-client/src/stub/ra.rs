//! Registration Authority stub.

use super::Caller;
use carpc_core::{
    AuthorityResult, Authorization, Certificate, CertificateRequest, Challenge, Registration,
    RegistrationAuthority, X509Certificate,
};
use carpc_protocol::envelope::{
    NewAuthorizationRequest, NewCertificateRequest, UpdateAuthorizationRequest,
    UpdateRegistrationRequest,
};
use carpc_protocol::{ClientEndpoint, Method, Role};
use std::sync::Arc;

/// [`RegistrationAuthority`] backed by a remote RA.
#[derive(Clone)]
pub struct RegistrationAuthorityClient {
    caller: Caller,
}

impl RegistrationAuthorityClient {
    pub fn new(endpoint: Arc<dyn ClientEndpoint>) -> Self {
        Self {
            caller: Caller::new(endpoint, Role::Ra),
        }
    }
}

impl RegistrationAuthority for RegistrationAuthorityClient {
    fn new_registration(&self, reg: Registration) -> AuthorityResult<Registration> {
        self.caller.call(Method::NewRegistration, &reg)
    }

    fn new_authorization(
        &self,
        authz: Authorization,
        reg_id: i64,
    ) -> AuthorityResult<Authorization> {
        self.caller.call(
            Method::NewAuthorization,
            &NewAuthorizationRequest { authz, reg_id },
        )
    }

    fn new_certificate(
        &self,
        req: CertificateRequest,
        reg_id: i64,
    ) -> AuthorityResult<Certificate> {
        self.caller
            .call(Method::NewCertificate, &NewCertificateRequest { req, reg_id })
    }

    fn update_registration(
        &self,
        base: Registration,
        update: Registration,
    ) -> AuthorityResult<Registration> {
        self.caller.call(
            Method::UpdateRegistration,
            &UpdateRegistrationRequest { base, update },
        )
    }

    fn update_authorization(
        &self,
        authz: Authorization,
        index: usize,
        response: Challenge,
    ) -> AuthorityResult<Authorization> {
        self.caller.call(
            Method::UpdateAuthorization,
            &UpdateAuthorizationRequest {
                authz,
                index,
                response,
            },
        )
    }

    fn revoke_certificate(&self, cert: &X509Certificate) -> AuthorityResult<()> {
        self.caller.call(Method::RevokeCertificate, cert)
    }

    fn on_validation_update(&self, authz: Authorization) -> AuthorityResult<()> {
        self.caller.call(Method::OnValidationUpdate, &authz)
    }
}
