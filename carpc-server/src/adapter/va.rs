//! Validation Authority adapter.

use super::{AdapterContext, Binder};
use crate::error::ServerError;
use carpc_core::ValidationAuthority;
use carpc_protocol::envelope::UpdateValidationsRequest;
use carpc_protocol::{Method, Role, ServerEndpoint};
use std::sync::Arc;

/// Registers every VA operation on `endpoint`, bound to `va`.
pub fn bind<E, V>(endpoint: &E, va: Arc<V>, ctx: &AdapterContext) -> Result<(), ServerError>
where
    E: ServerEndpoint + ?Sized,
    V: ValidationAuthority + ?Sized + 'static,
{
    let binder = Binder::new(endpoint, Role::Va, ctx);

    binder.register(
        Method::UpdateValidations,
        move |req: &UpdateValidationsRequest| va.update_validations(req.authz.clone(), req.index),
    )?;

    Ok(())
}
