//! Registration Authority adapter.

use super::{AdapterContext, Binder, HandlerOptions};
use crate::error::ServerError;
use carpc_core::{Authorization, Registration, RegistrationAuthority, X509Certificate};
use carpc_protocol::envelope::{
    NewAuthorizationRequest, NewCertificateRequest, UpdateAuthorizationRequest,
    UpdateRegistrationRequest,
};
use carpc_protocol::{Method, Role, ServerEndpoint};
use std::sync::Arc;

/// Registers every RA operation on `endpoint`, bound to `ra`.
pub fn bind<E, R>(endpoint: &E, ra: Arc<R>, ctx: &AdapterContext) -> Result<(), ServerError>
where
    E: ServerEndpoint + ?Sized,
    R: RegistrationAuthority + ?Sized + 'static,
{
    let binder = Binder::new(endpoint, Role::Ra, ctx);

    let r = ra.clone();
    binder.register(Method::NewRegistration, move |reg: &Registration| {
        r.new_registration(reg.clone())
    })?;

    let r = ra.clone();
    binder.register(
        Method::NewAuthorization,
        move |req: &NewAuthorizationRequest| r.new_authorization(req.authz.clone(), req.reg_id),
    )?;

    let r = ra.clone();
    binder.register_with(
        Method::NewCertificate,
        HandlerOptions::PROGRESS,
        move |req: &NewCertificateRequest| r.new_certificate(req.req.clone(), req.reg_id),
    )?;

    let r = ra.clone();
    binder.register(
        Method::UpdateRegistration,
        move |req: &UpdateRegistrationRequest| {
            r.update_registration(req.base.clone(), req.update.clone())
        },
    )?;

    let r = ra.clone();
    binder.register(
        Method::UpdateAuthorization,
        move |req: &UpdateAuthorizationRequest| {
            r.update_authorization(req.authz.clone(), req.index, req.response.clone())
        },
    )?;

    let r = ra.clone();
    binder.register(Method::RevokeCertificate, move |cert: &X509Certificate| {
        r.revoke_certificate(cert)
    })?;

    binder.register(Method::OnValidationUpdate, move |authz: &Authorization| {
        ra.on_validation_update(authz.clone())
    })?;

    Ok(())
}
