//! # carpc-core
//!
//! Domain value objects and authority interfaces shared by every carpc role.
//!
//! This crate provides:
//! - Registration, authorization, challenge and certificate records
//! - The four authority capability traits (RA, VA, CA, SA)
//! - The domain error type carried across process boundaries
//!
//! Nothing here performs I/O; business logic lives in the authority
//! implementations that are bound to the RPC adapters.

pub mod authority;
pub mod error;
#[cfg(feature = "fixtures")]
pub mod fixtures;
pub mod serde_base64;
pub mod types;

pub use authority::{
    CertificateAuthority, RegistrationAuthority, StorageAuthority, ValidationAuthority,
};
pub use error::{AuthorityError, AuthorityResult};
pub use types::{
    AcmeStatus, Authorization, Certificate, CertificateRequest, CertificateStatus, Challenge,
    Identifier, JsonWebKey, OcspSigningRequest, OcspStatus, Registration,
};

/// X.509 certificate in parsed form, as handed to revocation-by-presentation.
pub use x509_cert::Certificate as X509Certificate;

/// PKCS#10 certificate signing request in parsed form.
pub use x509_cert::request::CertReq;

/// Re-exported so that every crate in the workspace encodes DER with the same `der` version.
pub use x509_cert::der;
