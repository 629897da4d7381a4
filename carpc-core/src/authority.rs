//! Capability traits for the four cooperating authorities.
//!
//! Both the in-process implementations and the remote stubs implement these,
//! so callers never need to know which side of a process boundary they talk to.
//! Implementations are shared across concurrently running RPC handlers and
//! must therefore be `Send + Sync`.

use crate::error::AuthorityResult;
use crate::types::{
    Authorization, Certificate, CertificateRequest, CertificateStatus, Challenge, JsonWebKey,
    OcspSigningRequest, Registration,
};
use chrono::{DateTime, Utc};
use x509_cert::request::CertReq;
use x509_cert::Certificate as X509Certificate;

/// Registration Authority: the front door for subscriber requests.
pub trait RegistrationAuthority: Send + Sync {
    fn new_registration(&self, reg: Registration) -> AuthorityResult<Registration>;

    fn new_authorization(
        &self,
        authz: Authorization,
        reg_id: i64,
    ) -> AuthorityResult<Authorization>;

    fn new_certificate(
        &self,
        req: CertificateRequest,
        reg_id: i64,
    ) -> AuthorityResult<Certificate>;

    fn update_registration(
        &self,
        base: Registration,
        update: Registration,
    ) -> AuthorityResult<Registration>;

    /// Applies a subscriber's challenge response to the challenge at `index`.
    fn update_authorization(
        &self,
        authz: Authorization,
        index: usize,
        response: Challenge,
    ) -> AuthorityResult<Authorization>;

    fn revoke_certificate(&self, cert: &X509Certificate) -> AuthorityResult<()>;

    fn on_validation_update(&self, authz: Authorization) -> AuthorityResult<()>;
}

/// Validation Authority: performs challenge validation.
pub trait ValidationAuthority: Send + Sync {
    fn update_validations(&self, authz: Authorization, index: usize) -> AuthorityResult<()>;
}

/// Certificate Authority: signs certificates and OCSP responses.
pub trait CertificateAuthority: Send + Sync {
    fn issue_certificate(
        &self,
        csr: &CertReq,
        reg_id: i64,
        earliest_expiry: DateTime<Utc>,
    ) -> AuthorityResult<Certificate>;

    fn revoke_certificate(&self, serial: &str, reason_code: i32) -> AuthorityResult<()>;

    /// Returns a DER-encoded OCSP response.
    fn generate_ocsp(&self, req: OcspSigningRequest) -> AuthorityResult<Vec<u8>>;
}

/// Storage Authority: the persistence layer behind every other authority.
pub trait StorageAuthority: Send + Sync {
    fn get_registration(&self, id: i64) -> AuthorityResult<Registration>;

    fn get_registration_by_key(&self, key: &JsonWebKey) -> AuthorityResult<Registration>;

    fn get_authorization(&self, id: &str) -> AuthorityResult<Authorization>;

    /// Returns the DER bytes of the certificate with the given serial.
    fn get_certificate(&self, serial: &str) -> AuthorityResult<Vec<u8>>;

    /// Looks a certificate up by the short form of its serial.
    ///
    /// A missing certificate is reported as [`AuthorityError::NotFound`].
    ///
    /// [`AuthorityError::NotFound`]: crate::AuthorityError::NotFound
    fn get_certificate_by_short_serial(&self, short_serial: &str) -> AuthorityResult<Vec<u8>>;

    fn get_certificate_status(&self, serial: &str) -> AuthorityResult<CertificateStatus>;

    fn new_registration(&self, reg: Registration) -> AuthorityResult<Registration>;

    fn update_registration(&self, reg: Registration) -> AuthorityResult<()>;

    fn new_pending_authorization(&self, authz: Authorization) -> AuthorityResult<Authorization>;

    fn update_pending_authorization(&self, authz: Authorization) -> AuthorityResult<()>;

    fn finalize_authorization(&self, authz: Authorization) -> AuthorityResult<()>;

    fn mark_certificate_revoked(
        &self,
        serial: &str,
        ocsp_response: &[u8],
        reason_code: i32,
    ) -> AuthorityResult<()>;

    /// Stores a DER certificate and returns its serial.
    fn add_certificate(&self, der: &[u8], reg_id: i64) -> AuthorityResult<String>;

    /// Returns whether a CSR for exactly these names was denied before.
    fn already_denied_csr(&self, names: &[String]) -> AuthorityResult<bool>;
}
