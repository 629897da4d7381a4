//! Operation catalog.
//!
//! Operation names are the literal wire identifiers. A name may be served
//! by more than one role (`UpdateRegistration` exists on both RA and SA);
//! each role binds its own endpoint, so the namespaces never collide.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every operation name known to the layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    NewRegistration,
    NewAuthorization,
    NewCertificate,
    UpdateRegistration,
    UpdateAuthorization,
    RevokeCertificate,
    OnValidationUpdate,
    UpdateValidations,
    IssueCertificate,
    GenerateOcsp,
    GetRegistration,
    GetRegistrationByKey,
    GetAuthorization,
    GetCertificate,
    GetCertificateByShortSerial,
    GetCertificateStatus,
    NewPendingAuthorization,
    UpdatePendingAuthorization,
    FinalizeAuthorization,
    MarkCertificateRevoked,
    AddCertificate,
    AlreadyDeniedCsr,
}

impl Method {
    pub const ALL: &'static [Method] = &[
        Method::NewRegistration,
        Method::NewAuthorization,
        Method::NewCertificate,
        Method::UpdateRegistration,
        Method::UpdateAuthorization,
        Method::RevokeCertificate,
        Method::OnValidationUpdate,
        Method::UpdateValidations,
        Method::IssueCertificate,
        Method::GenerateOcsp,
        Method::GetRegistration,
        Method::GetRegistrationByKey,
        Method::GetAuthorization,
        Method::GetCertificate,
        Method::GetCertificateByShortSerial,
        Method::GetCertificateStatus,
        Method::NewPendingAuthorization,
        Method::UpdatePendingAuthorization,
        Method::FinalizeAuthorization,
        Method::MarkCertificateRevoked,
        Method::AddCertificate,
        Method::AlreadyDeniedCsr,
    ];

    /// Returns the wire identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::NewRegistration => "NewRegistration",
            Method::NewAuthorization => "NewAuthorization",
            Method::NewCertificate => "NewCertificate",
            Method::UpdateRegistration => "UpdateRegistration",
            Method::UpdateAuthorization => "UpdateAuthorization",
            Method::RevokeCertificate => "RevokeCertificate",
            Method::OnValidationUpdate => "OnValidationUpdate",
            Method::UpdateValidations => "UpdateValidations",
            Method::IssueCertificate => "IssueCertificate",
            Method::GenerateOcsp => "GenerateOCSP",
            Method::GetRegistration => "GetRegistration",
            Method::GetRegistrationByKey => "GetRegistrationByKey",
            Method::GetAuthorization => "GetAuthorization",
            Method::GetCertificate => "GetCertificate",
            Method::GetCertificateByShortSerial => "GetCertificateByShortSerial",
            Method::GetCertificateStatus => "GetCertificateStatus",
            Method::NewPendingAuthorization => "NewPendingAuthorization",
            Method::UpdatePendingAuthorization => "UpdatePendingAuthorization",
            Method::FinalizeAuthorization => "FinalizeAuthorization",
            Method::MarkCertificateRevoked => "MarkCertificateRevoked",
            Method::AddCertificate => "AddCertificate",
            Method::AlreadyDeniedCsr => "AlreadyDeniedCSR",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownOperation(s.to_string()))
    }
}

/// How a payload is laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// Field-name-keyed JSON.
    Structured,
    /// The bytes are the value (DER certificate, identifier, serial, OCSP).
    Raw,
    /// Exactly one byte: `0` is false, anything else is true.
    Flag,
    /// No payload.
    Empty,
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Structured => write!(f, "structured"),
            Encoding::Raw => write!(f, "raw"),
            Encoding::Flag => write!(f, "flag"),
            Encoding::Empty => write!(f, "empty"),
        }
    }
}

/// Encoding policy of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSpec {
    pub method: Method,
    pub request: Encoding,
    pub response: Encoding,
}

impl OperationSpec {
    const fn new(method: Method, request: Encoding, response: Encoding) -> Self {
        Self {
            method,
            request,
            response,
        }
    }

    /// Returns whether a successful call always carries a response payload.
    ///
    /// An empty success reply to such an operation is an anomaly.
    pub fn requires_response(&self) -> bool {
        self.response != Encoding::Empty
    }
}

use Encoding::{Empty, Flag, Raw, Structured};

const RA_OPERATIONS: &[OperationSpec] = &[
    OperationSpec::new(Method::NewRegistration, Structured, Structured),
    OperationSpec::new(Method::NewAuthorization, Structured, Structured),
    OperationSpec::new(Method::NewCertificate, Structured, Structured),
    OperationSpec::new(Method::UpdateRegistration, Structured, Structured),
    OperationSpec::new(Method::UpdateAuthorization, Structured, Structured),
    OperationSpec::new(Method::RevokeCertificate, Raw, Empty),
    OperationSpec::new(Method::OnValidationUpdate, Structured, Empty),
];

const VA_OPERATIONS: &[OperationSpec] = &[OperationSpec::new(
    Method::UpdateValidations,
    Structured,
    Empty,
)];

const CA_OPERATIONS: &[OperationSpec] = &[
    OperationSpec::new(Method::IssueCertificate, Structured, Structured),
    OperationSpec::new(Method::RevokeCertificate, Structured, Empty),
    OperationSpec::new(Method::GenerateOcsp, Structured, Raw),
];

const SA_OPERATIONS: &[OperationSpec] = &[
    OperationSpec::new(Method::GetRegistration, Structured, Structured),
    OperationSpec::new(Method::GetRegistrationByKey, Structured, Structured),
    OperationSpec::new(Method::GetAuthorization, Raw, Structured),
    OperationSpec::new(Method::GetCertificate, Raw, Raw),
    OperationSpec::new(Method::GetCertificateByShortSerial, Raw, Raw),
    OperationSpec::new(Method::GetCertificateStatus, Raw, Structured),
    OperationSpec::new(Method::NewRegistration, Structured, Structured),
    OperationSpec::new(Method::UpdateRegistration, Structured, Empty),
    OperationSpec::new(Method::NewPendingAuthorization, Structured, Structured),
    OperationSpec::new(Method::UpdatePendingAuthorization, Structured, Empty),
    OperationSpec::new(Method::FinalizeAuthorization, Structured, Empty),
    OperationSpec::new(Method::MarkCertificateRevoked, Structured, Empty),
    OperationSpec::new(Method::AddCertificate, Structured, Raw),
    OperationSpec::new(Method::AlreadyDeniedCsr, Structured, Flag),
];

/// The four authority roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Ra,
    Va,
    Ca,
    Sa,
}

impl Role {
    pub const ALL: &'static [Role] = &[Role::Ra, Role::Va, Role::Ca, Role::Sa];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Ra => "RA",
            Role::Va => "VA",
            Role::Ca => "CA",
            Role::Sa => "SA",
        }
    }

    /// Returns the operations served by this role, in registration order.
    pub fn operations(&self) -> &'static [OperationSpec] {
        match self {
            Role::Ra => RA_OPERATIONS,
            Role::Va => VA_OPERATIONS,
            Role::Ca => CA_OPERATIONS,
            Role::Sa => SA_OPERATIONS,
        }
    }

    /// Looks up the encoding policy of `method` on this role.
    pub fn spec(&self, method: Method) -> Result<&'static OperationSpec, ProtocolError> {
        self.operations()
            .iter()
            .find(|op| op.method == method)
            .ok_or_else(|| ProtocolError::UnknownOperation(format!("{} {}", self, method)))
    }

    pub fn serves(&self, method: Method) -> bool {
        self.spec(method).is_ok()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ra" => Ok(Role::Ra),
            "va" => Ok(Role::Va),
            "ca" => Ok(Role::Ca),
            "sa" => Ok(Role::Sa),
            other => Err(format!("unknown role '{}', expected ra, va, ca or sa", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_method_names_roundtrip() {
        for method in Method::ALL {
            assert_eq!(method.as_str().parse::<Method>().unwrap(), *method);
        }
        assert_eq!(Method::GenerateOcsp.as_str(), "GenerateOCSP");
        assert_eq!(Method::AlreadyDeniedCsr.as_str(), "AlreadyDeniedCSR");
    }

    #[test]
    fn test_unknown_method() {
        let err = "DeleteEverything".parse::<Method>().unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownOperation(name) if name == "DeleteEverything"));
    }

    #[test]
    fn test_no_role_registers_a_name_twice() {
        for role in Role::ALL {
            let names: HashSet<_> = role.operations().iter().map(|op| op.method).collect();
            assert_eq!(names.len(), role.operations().len(), "{role}");
        }
    }

    #[test]
    fn test_every_method_is_served_somewhere() {
        for method in Method::ALL {
            assert!(
                Role::ALL.iter().any(|role| role.serves(*method)),
                "{method} has no role"
            );
        }
    }

    #[test]
    fn test_shared_names_have_per_role_policies() {
        let ra = Role::Ra.spec(Method::RevokeCertificate).unwrap();
        let ca = Role::Ca.spec(Method::RevokeCertificate).unwrap();
        assert_eq!(ra.request, Encoding::Raw);
        assert_eq!(ca.request, Encoding::Structured);

        let ra = Role::Ra.spec(Method::UpdateRegistration).unwrap();
        let sa = Role::Sa.spec(Method::UpdateRegistration).unwrap();
        assert!(ra.requires_response());
        assert!(!sa.requires_response());
    }

    #[test]
    fn test_payload_required_for_issuance_paths() {
        for (role, method) in [
            (Role::Ra, Method::NewCertificate),
            (Role::Ca, Method::IssueCertificate),
            (Role::Sa, Method::AddCertificate),
            (Role::Sa, Method::AlreadyDeniedCsr),
        ] {
            assert!(role.spec(method).unwrap().requires_response());
        }
        assert_eq!(
            Role::Sa.spec(Method::AlreadyDeniedCsr).unwrap().response,
            Encoding::Flag
        );
    }

    #[test]
    fn test_role_does_not_serve_foreign_method() {
        assert!(!Role::Va.serves(Method::IssueCertificate));
        assert!(Role::Va.spec(Method::GetCertificate).is_err());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("SA".parse::<Role>().unwrap(), Role::Sa);
        assert_eq!("ca".parse::<Role>().unwrap(), Role::Ca);
        assert!("xa".parse::<Role>().is_err());
        assert_eq!(serde_json::to_string(&Role::Va).unwrap(), "\"va\"");
    }
}
