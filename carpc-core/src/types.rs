//! Domain value objects passed between authorities.
//!
//! These are snapshots: the RPC layer marshals them but never mutates or
//! retains them beyond a single call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A JSON Web Key identifying an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type (`RSA`, `EC`, ...).
    pub kty: String,
    /// Remaining key members, keyed by JWK parameter name. Members such as
    /// `key_ops` and `x5c` are not strings, so values stay as JSON.
    #[serde(flatten)]
    pub params: BTreeMap<String, Value>,
}

impl JsonWebKey {
    pub fn new(kty: impl Into<String>) -> Self {
        Self {
            kty: kty.into(),
            params: BTreeMap::new(),
        }
    }

    /// Adds a key member. `kty` is held in its own field and never in
    /// `params`; a string value replaces the key type, anything else is
    /// dropped.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let value = value.into();
        if name == "kty" {
            if let Value::String(kty) = value {
                self.kty = kty;
            }
        } else {
            self.params.insert(name, value);
        }
        self
    }
}

/// An account record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[serde(default)]
    pub id: i64,
    pub key: JsonWebKey,
    #[serde(default)]
    pub recovery_token: String,
    #[serde(default)]
    pub contact: Vec<String>,
    #[serde(default)]
    pub agreement: String,
}

impl Registration {
    /// Returns a copy of `self` with the subscriber-controlled fields taken
    /// from `update`.
    ///
    /// The key is always replaced; contact and agreement only when the update
    /// carries a value.
    pub fn merge_update(&self, update: &Registration) -> Registration {
        let mut merged = self.clone();
        merged.key = update.key.clone();
        if !update.contact.is_empty() {
            merged.contact = update.contact.clone();
        }
        if !update.agreement.is_empty() {
            merged.agreement = update.agreement.clone();
        }
        merged
    }
}

/// Lifecycle status shared by authorizations, challenges and certificates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcmeStatus {
    Unknown,
    #[default]
    Pending,
    Processing,
    Valid,
    Invalid,
    Revoked,
}

/// The name an authorization proves control over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub id_type: String,
    pub value: String,
}

impl Identifier {
    pub fn dns(value: impl Into<String>) -> Self {
        Self {
            id_type: "dns".to_string(),
            value: value.into(),
        }
    }
}

/// One validation mechanism within an authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    #[serde(rename = "type")]
    pub challenge_type: String,
    #[serde(default)]
    pub status: AcmeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_authorization: Option<String>,
}

/// Proof-of-control record for one identifier.
///
/// Challenges are addressed by their index, which never changes for the
/// lifetime of the authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    #[serde(default)]
    pub id: String,
    pub identifier: Identifier,
    #[serde(default)]
    pub registration_id: i64,
    #[serde(default)]
    pub status: AcmeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub challenges: Vec<Challenge>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub combinations: Vec<Vec<usize>>,
}

impl Authorization {
    /// Returns the challenge at `index`, if any.
    pub fn challenge(&self, index: usize) -> Option<&Challenge> {
        self.challenges.get(index)
    }
}

/// A certificate signing request as submitted by a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRequest {
    /// DER-encoded PKCS#10 request, carried opaquely.
    #[serde(with = "crate::serde_base64")]
    pub csr: Vec<u8>,
    #[serde(default)]
    pub authorizations: Vec<Authorization>,
}

/// An issued certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub registration_id: i64,
    #[serde(default)]
    pub status: AcmeStatus,
    pub serial: String,
    #[serde(default)]
    pub digest: String,
    #[serde(with = "crate::serde_base64")]
    pub der: Vec<u8>,
    pub issued: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

/// OCSP status of an issued certificate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcspStatus {
    #[default]
    Good,
    Revoked,
}

/// Revocation and validity state of an issued certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateStatus {
    pub serial: String,
    #[serde(default)]
    pub subscriber_approved: bool,
    pub status: OcspStatus,
    pub ocsp_last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revoked_reason: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_expiration_nag_sent: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::serde_base64")]
    pub ocsp_response: Vec<u8>,
}

/// Parameters for producing a signed OCSP response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcspSigningRequest {
    #[serde(with = "crate::serde_base64")]
    pub cert_der: Vec<u8>,
    pub status: OcspStatus,
    #[serde(default)]
    pub reason: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}
