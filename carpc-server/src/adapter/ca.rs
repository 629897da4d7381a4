//! Certificate Authority adapter.

use super::{AdapterContext, Binder, HandlerOptions};
use crate::error::ServerError;
use carpc_core::der::Decode;
use carpc_core::{CertReq, CertificateAuthority, OcspSigningRequest};
use carpc_protocol::envelope::{IssueCertificateRequest, RevokeCertificateRequest};
use carpc_protocol::{Encoding, Method, ProtocolError, Role, ServerEndpoint, WireFormat};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// `IssueCertificate` arguments with the CSR parsed.
///
/// Decoding fails if the CSR bytes are not a DER PKCS#10 request, so a
/// corrupt CSR is classified the same as a corrupt envelope.
#[derive(Debug)]
struct IssueCertificateArgs {
    csr: CertReq,
    reg_id: i64,
    earliest_expiry: DateTime<Utc>,
}

impl WireFormat for IssueCertificateArgs {
    const ENCODING: Encoding = Encoding::Structured;

    fn to_wire(&self) -> Result<Vec<u8>, ProtocolError> {
        use carpc_core::der::Encode;
        IssueCertificateRequest {
            csr: self.csr.to_der()?,
            reg_id: self.reg_id,
            earliest_expiry: self.earliest_expiry,
        }
        .to_wire()
    }

    fn from_wire(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let req = IssueCertificateRequest::from_wire(bytes)?;
        Ok(Self {
            csr: CertReq::from_der(&req.csr)?,
            reg_id: req.reg_id,
            earliest_expiry: req.earliest_expiry,
        })
    }
}

/// Registers every CA operation on `endpoint`, bound to `ca`.
pub fn bind<E, C>(endpoint: &E, ca: Arc<C>, ctx: &AdapterContext) -> Result<(), ServerError>
where
    E: ServerEndpoint + ?Sized,
    C: CertificateAuthority + ?Sized + 'static,
{
    let binder = Binder::new(endpoint, Role::Ca, ctx);

    let c = ca.clone();
    binder.register_with(
        Method::IssueCertificate,
        HandlerOptions::PROGRESS,
        move |args: &IssueCertificateArgs| {
            c.issue_certificate(&args.csr, args.reg_id, args.earliest_expiry)
        },
    )?;

    let c = ca.clone();
    binder.register(
        Method::RevokeCertificate,
        move |req: &RevokeCertificateRequest| c.revoke_certificate(&req.serial, req.reason_code),
    )?;

    binder.register(Method::GenerateOcsp, move |req: &OcspSigningRequest| {
        ca.generate_ocsp(req.clone())
    })?;

    Ok(())
}
