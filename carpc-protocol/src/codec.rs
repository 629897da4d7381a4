//! Envelope codec.
//!
//! Every value that crosses the wire implements [`WireFormat`], which fixes
//! both its encoding kind and its byte layout. [`Codec`] checks that kind
//! against the role's static operation table before encoding or decoding,
//! so a value can only travel under an operation whose policy matches it.

use crate::catalog::{Encoding, Method, OperationSpec, Role};
use crate::envelope::*;
use crate::error::ProtocolError;
use carpc_core::der::{Decode, Encode};
use carpc_core::{
    Authorization, Certificate, CertificateStatus, JsonWebKey, OcspSigningRequest, Registration,
    X509Certificate,
};

/// A value with a fixed wire representation.
pub trait WireFormat: Sized {
    const ENCODING: Encoding;

    fn to_wire(&self) -> Result<Vec<u8>, ProtocolError>;

    fn from_wire(bytes: &[u8]) -> Result<Self, ProtocolError>;
}

macro_rules! structured {
    ($($ty:ty),* $(,)?) => {
        $(
            impl WireFormat for $ty {
                const ENCODING: Encoding = Encoding::Structured;

                fn to_wire(&self) -> Result<Vec<u8>, ProtocolError> {
                    Ok(serde_json::to_vec(self)?)
                }

                fn from_wire(bytes: &[u8]) -> Result<Self, ProtocolError> {
                    Ok(serde_json::from_slice(bytes)?)
                }
            }
        )*
    };
}

structured!(
    Registration,
    JsonWebKey,
    Authorization,
    Certificate,
    CertificateStatus,
    OcspSigningRequest,
    NewAuthorizationRequest,
    NewCertificateRequest,
    UpdateRegistrationRequest,
    UpdateAuthorizationRequest,
    UpdateValidationsRequest,
    IssueCertificateRequest,
    RevokeCertificateRequest,
    RegistrationIdRequest,
    AddCertificateRequest,
    MarkCertificateRevokedRequest,
    DeniedCsrRequest,
);

/// Opaque bytes: certificate content and OCSP responses.
impl WireFormat for Vec<u8> {
    const ENCODING: Encoding = Encoding::Raw;

    fn to_wire(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(self.clone())
    }

    fn from_wire(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(bytes.to_vec())
    }
}

/// Identifiers and serials, carried as their UTF-8 bytes.
impl WireFormat for String {
    const ENCODING: Encoding = Encoding::Raw;

    fn to_wire(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(self.as_bytes().to_vec())
    }

    fn from_wire(bytes: &[u8]) -> Result<Self, ProtocolError> {
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
    }
}

/// A certificate presented for revocation, as DER.
impl WireFormat for X509Certificate {
    const ENCODING: Encoding = Encoding::Raw;

    fn to_wire(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(self.to_der()?)
    }

    fn from_wire(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(X509Certificate::from_der(bytes)?)
    }
}

impl WireFormat for bool {
    const ENCODING: Encoding = Encoding::Flag;

    fn to_wire(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(vec![u8::from(*self)])
    }

    fn from_wire(bytes: &[u8]) -> Result<Self, ProtocolError> {
        match bytes {
            [byte] => Ok(*byte != 0),
            other => Err(ProtocolError::InvalidFlag(other.len())),
        }
    }
}

/// Operations that answer with nothing. Any reply body is ignored.
impl WireFormat for () {
    const ENCODING: Encoding = Encoding::Empty;

    fn to_wire(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(Vec::new())
    }

    fn from_wire(_bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(())
    }
}

/// Encodes and decodes payloads for one role, enforcing its operation table.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
    role: Role,
}

impl Codec {
    pub fn new(role: Role) -> Self {
        Self { role }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn spec(&self, method: Method) -> Result<&'static OperationSpec, ProtocolError> {
        self.role.spec(method)
    }

    pub fn encode_request<T: WireFormat>(
        &self,
        method: Method,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        let spec = self.spec(method)?;
        check::<T>(method, spec.request)?;
        value.to_wire()
    }

    pub fn decode_request<T: WireFormat>(
        &self,
        method: Method,
        bytes: &[u8],
    ) -> Result<T, ProtocolError> {
        let spec = self.spec(method)?;
        check::<T>(method, spec.request)?;
        T::from_wire(bytes)
    }

    pub fn encode_response<T: WireFormat>(
        &self,
        method: Method,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        let spec = self.spec(method)?;
        check::<T>(method, spec.response)?;
        value.to_wire()
    }

    pub fn decode_response<T: WireFormat>(
        &self,
        method: Method,
        bytes: &[u8],
    ) -> Result<T, ProtocolError> {
        let spec = self.spec(method)?;
        check::<T>(method, spec.response)?;
        T::from_wire(bytes)
    }
}

fn check<T: WireFormat>(method: Method, expected: Encoding) -> Result<(), ProtocolError> {
    if T::ENCODING == expected {
        Ok(())
    } else {
        Err(ProtocolError::EncodingMismatch {
            method: method.to_string(),
            expected,
            actual: T::ENCODING,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carpc_core::fixtures::{
        sample_authorization, sample_challenge, sample_csr_der, sample_ocsp_request,
        sample_registration, sample_x509,
    };
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    #[test]
    fn test_structured_roundtrip_through_table() {
        let codec = Codec::new(Role::Ra);
        let req = UpdateAuthorizationRequest {
            authz: sample_authorization(),
            index: 1,
            response: sample_challenge("dvsni", "tok-dvsni"),
        };
        let bytes = codec
            .encode_request(Method::UpdateAuthorization, &req)
            .unwrap();
        let decoded: UpdateAuthorizationRequest = codec
            .decode_request(Method::UpdateAuthorization, &bytes)
            .unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_structured_payload_is_human_readable() {
        let codec = Codec::new(Role::Sa);
        let bytes = codec
            .encode_request(Method::AlreadyDeniedCsr, &DeniedCsrRequest {
                names: vec!["example.com".to_string()],
            })
            .unwrap();
        assert_eq!(bytes, br#"{"names":["example.com"]}"#);
    }

    #[test]
    fn test_raw_certificate_is_der() {
        let codec = Codec::new(Role::Ra);
        let cert = sample_x509(&[0x0a, 0x0b]);
        let bytes = codec
            .encode_request(Method::RevokeCertificate, &cert)
            .unwrap();
        assert_eq!(bytes, cert.to_der().unwrap());

        let decoded: X509Certificate = codec
            .decode_request(Method::RevokeCertificate, &bytes)
            .unwrap();
        assert_eq!(decoded, cert);
    }

    #[test]
    fn test_raw_certificate_rejects_garbage() {
        let codec = Codec::new(Role::Ra);
        let result: Result<X509Certificate, _> =
            codec.decode_request(Method::RevokeCertificate, b"not der");
        assert!(matches!(result, Err(ProtocolError::Der(_))));
    }

    #[test]
    fn test_identifier_is_raw_utf8() {
        let codec = Codec::new(Role::Sa);
        let bytes = codec
            .encode_request(Method::GetCertificate, &"00ab".to_string())
            .unwrap();
        assert_eq!(bytes, b"00ab");

        let result: Result<String, _> =
            codec.decode_request(Method::GetCertificate, &[0xff, 0xfe]);
        assert!(matches!(result, Err(ProtocolError::InvalidUtf8)));
    }

    #[test]
    fn test_flag_encoding() {
        let codec = Codec::new(Role::Sa);
        assert_eq!(
            codec
                .encode_response(Method::AlreadyDeniedCsr, &true)
                .unwrap(),
            vec![1]
        );
        assert_eq!(
            codec
                .encode_response(Method::AlreadyDeniedCsr, &false)
                .unwrap(),
            vec![0]
        );
    }

    #[test]
    fn test_flag_rejects_wrong_length() {
        let codec = Codec::new(Role::Sa);
        let result: Result<bool, _> = codec.decode_response(Method::AlreadyDeniedCsr, &[]);
        assert!(matches!(result, Err(ProtocolError::InvalidFlag(0))));
        let result: Result<bool, _> = codec.decode_response(Method::AlreadyDeniedCsr, &[1, 0]);
        assert!(matches!(result, Err(ProtocolError::InvalidFlag(2))));
    }

    #[test]
    fn test_encoding_mismatch_is_caught() {
        let codec = Codec::new(Role::Sa);
        let result = codec.encode_response(Method::AlreadyDeniedCsr, &sample_registration());
        assert!(matches!(
            result,
            Err(ProtocolError::EncodingMismatch {
                expected: Encoding::Flag,
                actual: Encoding::Structured,
                ..
            })
        ));
    }

    #[test]
    fn test_foreign_method_is_unknown() {
        let codec = Codec::new(Role::Va);
        let result = codec.encode_request(Method::GenerateOcsp, &sample_ocsp_request());
        assert!(matches!(result, Err(ProtocolError::UnknownOperation(_))));
    }

    #[test]
    fn test_issue_request_keeps_csr_opaque() {
        let codec = Codec::new(Role::Ca);
        let req = IssueCertificateRequest {
            csr: sample_csr_der("example.com"),
            reg_id: 5,
            earliest_expiry: Utc.with_ymd_and_hms(2015, 9, 1, 0, 0, 0).unwrap(),
        };
        let bytes = codec.encode_request(Method::IssueCertificate, &req).unwrap();
        let decoded: IssueCertificateRequest = codec
            .decode_request(Method::IssueCertificate, &bytes)
            .unwrap();
        assert_eq!(decoded.csr, req.csr);
    }

    #[test]
    fn test_structured_rejects_wrong_shape() {
        let codec = Codec::new(Role::Ra);
        let result: Result<NewAuthorizationRequest, _> =
            codec.decode_request(Method::NewAuthorization, br#"{"regId":"seven"}"#);
        assert!(matches!(result, Err(ProtocolError::Json(_))));
    }

    proptest! {
        #[test]
        fn prop_any_nonzero_byte_is_true(byte in 1u8..=255) {
            let codec = Codec::new(Role::Sa);
            let value: bool = codec.decode_response(Method::AlreadyDeniedCsr, &[byte]).unwrap();
            prop_assert!(value);
        }

        #[test]
        fn prop_raw_bytes_pass_through(data in proptest::collection::vec(any::<u8>(), 0..1024)) {
            let codec = Codec::new(Role::Sa);
            let bytes = codec.encode_response(Method::GetCertificate, &data).unwrap();
            prop_assert_eq!(&bytes, &data);
            let decoded: Vec<u8> = codec.decode_response(Method::GetCertificate, &bytes).unwrap();
            prop_assert_eq!(decoded, data);
        }

        #[test]
        fn prop_revoke_request_roundtrip(serial in "[0-9a-f]{1,36}", reason_code in 0i32..11) {
            let codec = Codec::new(Role::Ca);
            let req = RevokeCertificateRequest { serial, reason_code };
            let bytes = codec.encode_request(Method::RevokeCertificate, &req).unwrap();
            let decoded: RevokeCertificateRequest =
                codec.decode_request(Method::RevokeCertificate, &bytes).unwrap();
            prop_assert_eq!(decoded, req);
        }

        #[test]
        fn prop_registration_roundtrip(
            id in any::<i64>(),
            x in "[A-Za-z0-9_-]{0,43}",
            contact in proptest::collection::vec("mailto:[a-z]{1,8}@example\\.com", 0..3),
        ) {
            let codec = Codec::new(Role::Sa);
            let mut reg = sample_registration();
            reg.id = id;
            reg.key = reg.key.with_param("x", x);
            reg.contact = contact;
            let bytes = codec.encode_response(Method::GetRegistration, &reg).unwrap();
            let decoded: Registration = codec.decode_response(Method::GetRegistration, &bytes).unwrap();
            prop_assert_eq!(decoded, reg);
        }
    }
}
