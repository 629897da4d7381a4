//! Service adapters.
//!
//! Each role module exposes a `bind` function that registers one handler per
//! catalog operation on a [`ServerEndpoint`]. Every handler follows the same
//! ladder:
//!
//! 1. decode the payload; failure is an Improper Message and the domain
//!    implementation is never called
//! 2. invoke the domain implementation; failure is an Error Condition
//! 3. encode the result; failure is also an Error Condition
//!
//! Each failure produces exactly one audit record (with the not-found
//! exemption noted on [`HandlerOptions::quiet_not_found`]) and an error
//! reply. No partial response is ever produced.

pub mod ca;
pub mod ra;
pub mod sa;
pub mod va;

use crate::audit::{AuditLog, Auditor, TracingAuditLog};
use crate::error::ServerError;
use crate::metrics::Metrics;
use carpc_core::AuthorityResult;
use carpc_protocol::{
    Codec, ErrorCode, Handler, Method, ProtocolError, Role, RpcError, ServerEndpoint, WireFormat,
};
use std::fmt::Debug;
use std::sync::Arc;

/// Collaborators shared by every handler an adapter registers.
#[derive(Clone)]
pub struct AdapterContext {
    audit: Arc<dyn AuditLog>,
    metrics: Option<Arc<Metrics>>,
}

impl Default for AdapterContext {
    fn default() -> Self {
        Self::new(Arc::new(TracingAuditLog))
    }
}

impl AdapterContext {
    pub fn new(audit: Arc<dyn AuditLog>) -> Self {
        Self {
            audit,
            metrics: None,
        }
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Per-operation handler behaviour.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct HandlerOptions {
    /// Emit "entering" / "decoded" / "issued" progress markers.
    pub progress: bool,
    /// Do not audit a `NotFound` domain error. The caller still receives it.
    pub quiet_not_found: bool,
}

impl HandlerOptions {
    pub(crate) const PROGRESS: Self = Self {
        progress: true,
        quiet_not_found: false,
    };

    pub(crate) const QUIET_NOT_FOUND: Self = Self {
        progress: false,
        quiet_not_found: true,
    };
}

/// Registers handlers for one role on one endpoint.
pub(crate) struct Binder<'a, E: ServerEndpoint + ?Sized> {
    endpoint: &'a E,
    codec: Codec,
    auditor: Auditor,
    metrics: Option<Arc<Metrics>>,
}

impl<'a, E: ServerEndpoint + ?Sized> Binder<'a, E> {
    pub(crate) fn new(endpoint: &'a E, role: Role, ctx: &AdapterContext) -> Self {
        Self {
            endpoint,
            codec: Codec::new(role),
            auditor: Auditor::new(ctx.audit.clone(), ctx.metrics.clone()),
            metrics: ctx.metrics.clone(),
        }
    }

    pub(crate) fn register<Req, Resp, F>(&self, method: Method, call: F) -> Result<(), ServerError>
    where
        Req: WireFormat + Debug + 'static,
        Resp: WireFormat + 'static,
        F: Fn(&Req) -> AuthorityResult<Resp> + Send + Sync + 'static,
    {
        self.register_with(method, HandlerOptions::default(), call)
    }

    pub(crate) fn register_with<Req, Resp, F>(
        &self,
        method: Method,
        options: HandlerOptions,
        call: F,
    ) -> Result<(), ServerError>
    where
        Req: WireFormat + Debug + 'static,
        Resp: WireFormat + 'static,
        F: Fn(&Req) -> AuthorityResult<Resp> + Send + Sync + 'static,
    {
        let spec = self.codec.spec(method)?;
        for (expected, actual) in [(spec.request, Req::ENCODING), (spec.response, Resp::ENCODING)] {
            if expected != actual {
                return Err(ProtocolError::EncodingMismatch {
                    method: method.to_string(),
                    expected,
                    actual,
                }
                .into());
            }
        }

        let codec = self.codec;
        let auditor = self.auditor.clone();
        let metrics = self.metrics.clone();

        let handler: Handler = Arc::new(move |payload: &[u8]| {
            let name = method.as_str();
            let _timer = metrics
                .as_ref()
                .map(|m| m.call_duration.with_label_values(&[name]).start_timer());

            let result = handle_call(&codec, &auditor, method, options, &call, payload);

            if let Some(ref metrics) = metrics {
                metrics.calls_total.with_label_values(&[name]).inc();
                if let Err(ref e) = result {
                    metrics
                        .errors_total
                        .with_label_values(&[e.code.to_string().as_str()])
                        .inc();
                }
            }
            result
        });

        self.endpoint.handle(method.as_str(), handler)?;
        tracing::debug!(role = %self.codec.role(), method = %method, "Registered handler");
        Ok(())
    }
}

fn handle_call<Req, Resp, F>(
    codec: &Codec,
    auditor: &Auditor,
    method: Method,
    options: HandlerOptions,
    call: &F,
    payload: &[u8],
) -> Result<Vec<u8>, RpcError>
where
    Req: WireFormat + Debug,
    Resp: WireFormat,
    F: Fn(&Req) -> AuthorityResult<Resp>,
{
    let name = method.as_str();
    if options.progress {
        tracing::info!(method = name, "entering");
    }

    let req: Req = match codec.decode_request(method, payload) {
        Ok(req) => req,
        Err(e) => {
            auditor.improper_message(name, &e, payload);
            return Err(RpcError::improper_message(e.to_string()));
        }
    };
    if options.progress {
        tracing::info!(method = name, "decoded");
    }

    let resp = match call(&req) {
        Ok(resp) => resp,
        Err(e) => {
            if !(options.quiet_not_found && e.is_not_found()) {
                auditor.error_condition(name, &e, &req);
            } else {
                tracing::debug!(method = name, error = %e, "Not found");
            }
            return Err(RpcError::from_authority(&e));
        }
    };

    match codec.encode_response(method, &resp) {
        Ok(bytes) => {
            if options.progress {
                tracing::info!(method = name, "issued");
            }
            Ok(bytes)
        }
        Err(e) => {
            auditor.error_condition(name, &e, &req);
            Err(RpcError::new(ErrorCode::EncodeFailed, e.to_string()))
        }
    }
}
