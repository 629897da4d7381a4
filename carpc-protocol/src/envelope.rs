//! Request records for operations that carry more than one domain value.
//!
//! Operations whose request is a single domain object (`NewRegistration`,
//! `GenerateOCSP`, `FinalizeAuthorization`, ...) send that object directly.

use carpc_core::{Authorization, CertificateRequest, Challenge, Registration};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// RA `NewAuthorization`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuthorizationRequest {
    pub authz: Authorization,
    pub reg_id: i64,
}

/// RA `NewCertificate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCertificateRequest {
    pub req: CertificateRequest,
    pub reg_id: i64,
}

/// RA `UpdateRegistration`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRegistrationRequest {
    pub base: Registration,
    pub update: Registration,
}

/// RA `UpdateAuthorization`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAuthorizationRequest {
    pub authz: Authorization,
    pub index: usize,
    pub response: Challenge,
}

/// VA `UpdateValidations`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateValidationsRequest {
    pub authz: Authorization,
    pub index: usize,
}

/// CA `IssueCertificate`. The CSR travels as opaque DER.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCertificateRequest {
    #[serde(with = "carpc_core::serde_base64")]
    pub csr: Vec<u8>,
    pub reg_id: i64,
    pub earliest_expiry: DateTime<Utc>,
}

/// CA `RevokeCertificate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeCertificateRequest {
    pub serial: String,
    pub reason_code: i32,
}

/// SA `GetRegistration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationIdRequest {
    pub id: i64,
}

/// SA `AddCertificate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCertificateRequest {
    #[serde(with = "carpc_core::serde_base64")]
    pub der: Vec<u8>,
    pub reg_id: i64,
}

/// SA `MarkCertificateRevoked`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkCertificateRevokedRequest {
    pub serial: String,
    #[serde(with = "carpc_core::serde_base64")]
    pub ocsp_response: Vec<u8>,
    pub reason_code: i32,
}

/// SA `AlreadyDeniedCSR`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeniedCsrRequest {
    pub names: Vec<String>,
}
