//! Validation Authority stub.

use super::Caller;
use carpc_core::{AuthorityResult, Authorization, ValidationAuthority};
use carpc_protocol::envelope::UpdateValidationsRequest;
use carpc_protocol::{ClientEndpoint, Method, Role};
use std::sync::Arc;

/// [`ValidationAuthority`] backed by a remote VA.
#[derive(Clone)]
pub struct ValidationAuthorityClient {
    caller: Caller,
}

impl ValidationAuthorityClient {
    pub fn new(endpoint: Arc<dyn ClientEndpoint>) -> Self {
        Self {
            caller: Caller::new(endpoint, Role::Va),
        }
    }
}

impl ValidationAuthority for ValidationAuthorityClient {
    /// Dispatch and transport failures are reported to the caller.
    fn update_validations(&self, authz: Authorization, index: usize) -> AuthorityResult<()> {
        self.caller.call(
            Method::UpdateValidations,
            &UpdateValidationsRequest { authz, index },
        )
    }
}
