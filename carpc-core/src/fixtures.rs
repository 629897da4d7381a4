//! Sample values and recording fakes of the four authorities.
//!
//! Enabled with the `fixtures` feature; used by the adapter and stub tests.

use crate::authority::{
    CertificateAuthority, RegistrationAuthority, StorageAuthority, ValidationAuthority,
};
use crate::error::{AuthorityError, AuthorityResult};
use crate::types::*;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use std::time::Duration;
use x509_cert::certificate::{TbsCertificate, Version};
use x509_cert::der::asn1::{BitString, ObjectIdentifier, UtcTime};
use x509_cert::der::Encode;
use x509_cert::name::Name;
use x509_cert::request::{CertReq, CertReqInfo, Version as CsrVersion};
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::time::{Time, Validity};
use x509_cert::Certificate as X509Certificate;

const ID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");

// ============================================================================
// Sample values
// ============================================================================

/// 2015-06-01T00:00:00Z.
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2015, 6, 1, 0, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub fn sample_key(x: &str) -> JsonWebKey {
    JsonWebKey::new("EC")
        .with_param("crv", "P-256")
        .with_param("x", x)
        .with_param("y", "WCs6r4UbdWJh2cDVn3ZRbQhmQJ5QGyLbzyVCbYhqP9Y")
}

pub fn sample_registration() -> Registration {
    Registration {
        id: 1,
        key: sample_key("f0bY3tUxYeDhTeyvlHSa6aeZkyyTvg4dP0UmQv8mv1g"),
        recovery_token: "recovery".to_string(),
        contact: vec!["mailto:admin@example.com".to_string()],
        agreement: String::new(),
    }
}

pub fn sample_challenge(challenge_type: &str, token: &str) -> Challenge {
    Challenge {
        challenge_type: challenge_type.to_string(),
        status: AcmeStatus::Pending,
        validated: None,
        uri: format!("/acme/challenge/{token}"),
        token: token.to_string(),
        key_authorization: None,
    }
}

pub fn sample_authorization() -> Authorization {
    Authorization {
        id: "authz-1".to_string(),
        identifier: Identifier::dns("example.com"),
        registration_id: 1,
        status: AcmeStatus::Pending,
        expires: Some(fixed_time() + ChronoDuration::days(30)),
        challenges: vec![
            sample_challenge("simpleHttp", "tok-http"),
            sample_challenge("dvsni", "tok-dvsni"),
        ],
        combinations: vec![vec![0], vec![1]],
    }
}

fn algorithm(oid: ObjectIdentifier) -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid,
        parameters: None,
    }
}

fn sample_public_key() -> SubjectPublicKeyInfoOwned {
    let mut point = vec![0x04];
    point.extend(std::iter::repeat(0x5a).take(64));
    SubjectPublicKeyInfoOwned {
        algorithm: algorithm(ID_EC_PUBLIC_KEY),
        subject_public_key: BitString::from_bytes(&point).expect("valid bit string"),
    }
}

fn sample_signature() -> BitString {
    BitString::from_bytes(&[0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x01])
        .expect("valid bit string")
}

/// An unsigned-but-well-formed PKCS#10 request for `common_name`.
pub fn sample_csr(common_name: &str) -> CertReq {
    CertReq {
        info: CertReqInfo {
            version: CsrVersion::V1,
            subject: Name::from_str(&format!("CN={common_name}")).expect("valid subject"),
            public_key: sample_public_key(),
            attributes: Default::default(),
        },
        algorithm: algorithm(ECDSA_WITH_SHA256),
        signature: sample_signature(),
    }
}

pub fn sample_csr_der(common_name: &str) -> Vec<u8> {
    sample_csr(common_name).to_der().expect("encodable CSR")
}

/// A structurally valid X.509 certificate with the given serial bytes.
pub fn sample_x509(serial: &[u8]) -> X509Certificate {
    let not_before = UtcTime::from_unix_duration(Duration::from_secs(1_433_116_800))
        .expect("valid not_before");
    let not_after = UtcTime::from_unix_duration(Duration::from_secs(1_440_892_800))
        .expect("valid not_after");
    X509Certificate {
        tbs_certificate: TbsCertificate {
            version: Version::V3,
            serial_number: SerialNumber::new(serial).expect("valid serial"),
            signature: algorithm(ECDSA_WITH_SHA256),
            issuer: Name::from_str("CN=carpc test issuer").expect("valid issuer"),
            validity: Validity {
                not_before: Time::UtcTime(not_before),
                not_after: Time::UtcTime(not_after),
            },
            subject: Name::from_str("CN=example.com").expect("valid subject"),
            subject_public_key_info: sample_public_key(),
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: None,
        },
        signature_algorithm: algorithm(ECDSA_WITH_SHA256),
        signature: sample_signature(),
    }
}

pub fn sample_x509_der(serial: &[u8]) -> Vec<u8> {
    sample_x509(serial).to_der().expect("encodable certificate")
}

pub fn sample_certificate(reg_id: i64, der: Vec<u8>) -> Certificate {
    Certificate {
        registration_id: reg_id,
        status: AcmeStatus::Valid,
        serial: "000000000000000000000000000000000a1b2c".to_string(),
        digest: "sha256:placeholder".to_string(),
        der,
        issued: fixed_time(),
        expires: fixed_time() + ChronoDuration::days(90),
    }
}

pub fn sample_certificate_status(serial: &str) -> CertificateStatus {
    CertificateStatus {
        serial: serial.to_string(),
        subscriber_approved: false,
        status: OcspStatus::Good,
        ocsp_last_updated: fixed_time(),
        revoked_date: None,
        revoked_reason: 0,
        last_expiration_nag_sent: None,
        ocsp_response: vec![0x30, 0x03, 0x0a, 0x01, 0x00],
    }
}

pub fn sample_ocsp_request() -> OcspSigningRequest {
    OcspSigningRequest {
        cert_der: sample_x509_der(&[0x0a, 0x1b, 0x2c]),
        status: OcspStatus::Revoked,
        reason: 1,
        revoked_at: Some(fixed_time()),
    }
}

// ============================================================================
// Call recording
// ============================================================================

type Failure = Box<dyn Fn(&'static str) -> Option<AuthorityError> + Send + Sync>;

/// Records every invocation and optionally injects failures.
#[derive(Default)]
pub struct CallLog {
    calls: Mutex<Vec<&'static str>>,
    failure: Mutex<Option<Failure>>,
}

impl CallLog {
    fn enter(&self, method: &'static str) -> AuthorityResult<()> {
        self.calls.lock().push(method);
        match self.failure.lock().as_ref() {
            Some(fail) => fail(method).map_or(Ok(()), Err),
            None => Ok(()),
        }
    }

    /// Makes every call for which `fail` returns `Some` fail with that error.
    pub fn fail_with<F>(&self, fail: F)
    where
        F: Fn(&'static str) -> Option<AuthorityError> + Send + Sync + 'static,
    {
        *self.failure.lock() = Some(Box::new(fail));
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|m| **m == method).count()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }
}

// ============================================================================
// Fakes
// ============================================================================

/// Registration authority that echoes its inputs with predictable edits.
#[derive(Default)]
pub struct FakeRegistrationAuthority {
    pub log: CallLog,
    revoked: Mutex<Vec<Vec<u8>>>,
}

impl FakeRegistrationAuthority {
    /// DER serial numbers of every certificate passed to `revoke_certificate`.
    pub fn revoked_serials(&self) -> Vec<Vec<u8>> {
        self.revoked.lock().clone()
    }
}

impl RegistrationAuthority for FakeRegistrationAuthority {
    fn new_registration(&self, mut reg: Registration) -> AuthorityResult<Registration> {
        self.log.enter("NewRegistration")?;
        if reg.id == 0 {
            reg.id = 1;
        }
        Ok(reg)
    }

    fn new_authorization(
        &self,
        mut authz: Authorization,
        reg_id: i64,
    ) -> AuthorityResult<Authorization> {
        self.log.enter("NewAuthorization")?;
        authz.registration_id = reg_id;
        if authz.id.is_empty() {
            authz.id = format!("authz-{reg_id}");
        }
        authz.status = AcmeStatus::Pending;
        Ok(authz)
    }

    fn new_certificate(
        &self,
        req: CertificateRequest,
        reg_id: i64,
    ) -> AuthorityResult<Certificate> {
        self.log.enter("NewCertificate")?;
        Ok(sample_certificate(reg_id, req.csr))
    }

    fn update_registration(
        &self,
        base: Registration,
        update: Registration,
    ) -> AuthorityResult<Registration> {
        self.log.enter("UpdateRegistration")?;
        Ok(base.merge_update(&update))
    }

    fn update_authorization(
        &self,
        mut authz: Authorization,
        index: usize,
        response: Challenge,
    ) -> AuthorityResult<Authorization> {
        self.log.enter("UpdateAuthorization")?;
        let challenge = authz.challenges.get_mut(index).ok_or_else(|| {
            AuthorityError::Malformed(format!("challenge index {index} out of range"))
        })?;
        challenge.key_authorization = response.key_authorization;
        challenge.status = AcmeStatus::Processing;
        Ok(authz)
    }

    fn revoke_certificate(&self, cert: &X509Certificate) -> AuthorityResult<()> {
        self.log.enter("RevokeCertificate")?;
        self.revoked
            .lock()
            .push(cert.tbs_certificate.serial_number.as_bytes().to_vec());
        Ok(())
    }

    fn on_validation_update(&self, _authz: Authorization) -> AuthorityResult<()> {
        self.log.enter("OnValidationUpdate")
    }
}

/// Validation authority that records which challenge it was asked to validate.
#[derive(Default)]
pub struct FakeValidationAuthority {
    pub log: CallLog,
    requests: Mutex<Vec<(String, usize)>>,
}

impl FakeValidationAuthority {
    pub fn requests(&self) -> Vec<(String, usize)> {
        self.requests.lock().clone()
    }
}

impl ValidationAuthority for FakeValidationAuthority {
    fn update_validations(&self, authz: Authorization, index: usize) -> AuthorityResult<()> {
        self.log.enter("UpdateValidations")?;
        self.requests.lock().push((authz.id, index));
        Ok(())
    }
}

/// Certificate authority that "signs" by echoing the CSR.
#[derive(Default)]
pub struct FakeCertificateAuthority {
    pub log: CallLog,
    revocations: Mutex<Vec<(String, i32)>>,
}

impl FakeCertificateAuthority {
    pub fn revocations(&self) -> Vec<(String, i32)> {
        self.revocations.lock().clone()
    }
}

impl CertificateAuthority for FakeCertificateAuthority {
    fn issue_certificate(
        &self,
        csr: &CertReq,
        reg_id: i64,
        earliest_expiry: DateTime<Utc>,
    ) -> AuthorityResult<Certificate> {
        self.log.enter("IssueCertificate")?;
        let der = csr
            .to_der()
            .map_err(|e| AuthorityError::Internal(e.to_string()))?;
        let mut cert = sample_certificate(reg_id, der);
        cert.expires = earliest_expiry;
        Ok(cert)
    }

    fn revoke_certificate(&self, serial: &str, reason_code: i32) -> AuthorityResult<()> {
        self.log.enter("RevokeCertificate")?;
        self.revocations
            .lock()
            .push((serial.to_string(), reason_code));
        Ok(())
    }

    fn generate_ocsp(&self, req: OcspSigningRequest) -> AuthorityResult<Vec<u8>> {
        self.log.enter("GenerateOCSP")?;
        let mut response = vec![0x30, req.reason as u8];
        response.extend_from_slice(&req.cert_der[..req.cert_der.len().min(4)]);
        Ok(response)
    }
}

/// In-memory storage authority.
#[derive(Default)]
pub struct FakeStorageAuthority {
    pub log: CallLog,
    certificates: Mutex<BTreeMap<String, Vec<u8>>>,
    denied: Mutex<HashSet<String>>,
    next_id: Mutex<i64>,
}

impl FakeStorageAuthority {
    /// Marks `names` as previously denied.
    pub fn deny(&self, names: &[&str]) {
        let mut denied = self.denied.lock();
        for name in names {
            denied.insert(name.to_string());
        }
    }

    fn allocate_id(&self) -> i64 {
        let mut next = self.next_id.lock();
        *next += 1;
        *next
    }
}

impl StorageAuthority for FakeStorageAuthority {
    fn get_registration(&self, id: i64) -> AuthorityResult<Registration> {
        self.log.enter("GetRegistration")?;
        let mut reg = sample_registration();
        reg.id = id;
        Ok(reg)
    }

    fn get_registration_by_key(&self, key: &JsonWebKey) -> AuthorityResult<Registration> {
        self.log.enter("GetRegistrationByKey")?;
        let mut reg = sample_registration();
        reg.key = key.clone();
        Ok(reg)
    }

    fn get_authorization(&self, id: &str) -> AuthorityResult<Authorization> {
        self.log.enter("GetAuthorization")?;
        let mut authz = sample_authorization();
        authz.id = id.to_string();
        Ok(authz)
    }

    fn get_certificate(&self, serial: &str) -> AuthorityResult<Vec<u8>> {
        self.log.enter("GetCertificate")?;
        self.certificates
            .lock()
            .get(serial)
            .cloned()
            .ok_or_else(|| AuthorityError::NotFound(format!("no certificate with serial {serial}")))
    }

    fn get_certificate_by_short_serial(&self, short_serial: &str) -> AuthorityResult<Vec<u8>> {
        self.log.enter("GetCertificateByShortSerial")?;
        self.certificates
            .lock()
            .iter()
            .find(|(serial, _)| serial.ends_with(short_serial))
            .map(|(_, der)| der.clone())
            .ok_or_else(|| AuthorityError::NotFound("sql: no rows in result set".to_string()))
    }

    fn get_certificate_status(&self, serial: &str) -> AuthorityResult<CertificateStatus> {
        self.log.enter("GetCertificateStatus")?;
        if !self.certificates.lock().contains_key(serial) {
            return Err(AuthorityError::NotFound(format!(
                "no status for serial {serial}"
            )));
        }
        Ok(sample_certificate_status(serial))
    }

    fn new_registration(&self, mut reg: Registration) -> AuthorityResult<Registration> {
        self.log.enter("NewRegistration")?;
        reg.id = self.allocate_id();
        Ok(reg)
    }

    fn update_registration(&self, _reg: Registration) -> AuthorityResult<()> {
        self.log.enter("UpdateRegistration")
    }

    fn new_pending_authorization(
        &self,
        mut authz: Authorization,
    ) -> AuthorityResult<Authorization> {
        self.log.enter("NewPendingAuthorization")?;
        authz.id = format!("authz-{}", self.allocate_id());
        authz.status = AcmeStatus::Pending;
        Ok(authz)
    }

    fn update_pending_authorization(&self, _authz: Authorization) -> AuthorityResult<()> {
        self.log.enter("UpdatePendingAuthorization")
    }

    fn finalize_authorization(&self, _authz: Authorization) -> AuthorityResult<()> {
        self.log.enter("FinalizeAuthorization")
    }

    fn mark_certificate_revoked(
        &self,
        serial: &str,
        _ocsp_response: &[u8],
        _reason_code: i32,
    ) -> AuthorityResult<()> {
        self.log.enter("MarkCertificateRevoked")?;
        if !self.certificates.lock().contains_key(serial) {
            return Err(AuthorityError::NotFound(format!(
                "no certificate with serial {serial}"
            )));
        }
        Ok(())
    }

    fn add_certificate(&self, der: &[u8], _reg_id: i64) -> AuthorityResult<String> {
        self.log.enter("AddCertificate")?;
        let serial = format!("{:036x}", self.allocate_id());
        self.certificates
            .lock()
            .insert(serial.clone(), der.to_vec());
        Ok(serial)
    }

    fn already_denied_csr(&self, names: &[String]) -> AuthorityResult<bool> {
        self.log.enter("AlreadyDeniedCSR")?;
        let denied = self.denied.lock();
        Ok(!names.is_empty() && names.iter().all(|name| denied.contains(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x509_cert::der::Decode;

    #[test]
    fn test_sample_csr_der_roundtrip() {
        let der = sample_csr_der("example.com");
        let parsed = CertReq::from_der(&der).unwrap();
        assert_eq!(parsed, sample_csr("example.com"));
    }

    #[test]
    fn test_sample_x509_der_roundtrip() {
        let der = sample_x509_der(&[0x01, 0x02]);
        let parsed = X509Certificate::from_der(&der).unwrap();
        assert_eq!(parsed.tbs_certificate.serial_number.as_bytes(), &[0x01, 0x02]);
    }

    #[test]
    fn test_call_log_failure_injection() {
        let sa = FakeStorageAuthority::default();
        sa.log.fail_with(|method| {
            (method == "GetRegistration").then(|| AuthorityError::Internal("boom".into()))
        });
        assert!(sa.get_registration(1).is_err());
        assert!(sa.get_authorization("a").is_ok());
        assert_eq!(sa.log.calls(), vec!["GetRegistration", "GetAuthorization"]);
    }

    #[test]
    fn test_fake_storage_short_serial() {
        let sa = FakeStorageAuthority::default();
        let serial = sa.add_certificate(b"cert", 1).unwrap();
        assert_eq!(serial.len(), 36);
        assert_eq!(sa.get_certificate_by_short_serial("01").unwrap(), b"cert");
        assert!(sa
            .get_certificate_by_short_serial("ff")
            .unwrap_err()
            .is_not_found());
    }
}
