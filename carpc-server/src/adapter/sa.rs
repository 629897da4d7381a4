//! Storage Authority adapter.

use super::{AdapterContext, Binder, HandlerOptions};
use crate::error::ServerError;
use carpc_core::{Authorization, JsonWebKey, Registration, StorageAuthority};
use carpc_protocol::envelope::{
    AddCertificateRequest, DeniedCsrRequest, MarkCertificateRevokedRequest, RegistrationIdRequest,
};
use carpc_protocol::{Method, Role, ServerEndpoint};
use std::sync::Arc;

/// Registers every SA operation on `endpoint`, bound to `sa`.
pub fn bind<E, S>(endpoint: &E, sa: Arc<S>, ctx: &AdapterContext) -> Result<(), ServerError>
where
    E: ServerEndpoint + ?Sized,
    S: StorageAuthority + ?Sized + 'static,
{
    let binder = Binder::new(endpoint, Role::Sa, ctx);

    let s = sa.clone();
    binder.register(Method::GetRegistration, move |req: &RegistrationIdRequest| {
        s.get_registration(req.id)
    })?;

    let s = sa.clone();
    binder.register(Method::GetRegistrationByKey, move |key: &JsonWebKey| {
        s.get_registration_by_key(key)
    })?;

    let s = sa.clone();
    binder.register(Method::GetAuthorization, move |id: &String| {
        s.get_authorization(id)
    })?;

    let s = sa.clone();
    binder.register(Method::GetCertificate, move |serial: &String| {
        s.get_certificate(serial)
    })?;

    // A missing certificate is an expected answer here, not a fault.
    let s = sa.clone();
    binder.register_with(
        Method::GetCertificateByShortSerial,
        HandlerOptions::QUIET_NOT_FOUND,
        move |serial: &String| s.get_certificate_by_short_serial(serial),
    )?;

    let s = sa.clone();
    binder.register(Method::GetCertificateStatus, move |serial: &String| {
        s.get_certificate_status(serial)
    })?;

    let s = sa.clone();
    binder.register(Method::NewRegistration, move |reg: &Registration| {
        s.new_registration(reg.clone())
    })?;

    let s = sa.clone();
    binder.register(Method::UpdateRegistration, move |reg: &Registration| {
        s.update_registration(reg.clone())
    })?;

    let s = sa.clone();
    binder.register(
        Method::NewPendingAuthorization,
        move |authz: &Authorization| s.new_pending_authorization(authz.clone()),
    )?;

    let s = sa.clone();
    binder.register(
        Method::UpdatePendingAuthorization,
        move |authz: &Authorization| s.update_pending_authorization(authz.clone()),
    )?;

    let s = sa.clone();
    binder.register(
        Method::FinalizeAuthorization,
        move |authz: &Authorization| s.finalize_authorization(authz.clone()),
    )?;

    let s = sa.clone();
    binder.register(
        Method::MarkCertificateRevoked,
        move |req: &MarkCertificateRevokedRequest| {
            s.mark_certificate_revoked(&req.serial, &req.ocsp_response, req.reason_code)
        },
    )?;

    let s = sa.clone();
    binder.register(Method::AddCertificate, move |req: &AddCertificateRequest| {
        s.add_certificate(&req.der, req.reg_id)
    })?;

    binder.register(Method::AlreadyDeniedCsr, move |req: &DeniedCsrRequest| {
        sa.already_denied_csr(&req.names)
    })?;

    Ok(())
}
