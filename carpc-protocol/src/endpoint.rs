//! Transport-facing traits and the in-process loopback transport.

use crate::error::{DispatchError, ProtocolError, RpcError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A synchronous byte-to-byte operation handler.
///
/// The transport may invoke the same handler concurrently.
pub type Handler = Arc<dyn Fn(&[u8]) -> Result<Vec<u8>, RpcError> + Send + Sync>;

/// The server half of a transport.
pub trait ServerEndpoint: Send + Sync {
    /// Registers `handler` for `method`.
    ///
    /// Registering a second handler for the same name fails with
    /// [`ProtocolError::DuplicateHandler`].
    fn handle(&self, method: &str, handler: Handler) -> Result<(), ProtocolError>;
}

/// The client half of a transport.
pub trait ClientEndpoint: Send + Sync {
    /// Sends one call and blocks until its reply or a transport failure.
    fn dispatch_sync(&self, method: &str, payload: Vec<u8>) -> Result<Vec<u8>, DispatchError>;
}

impl<T: ServerEndpoint + ?Sized> ServerEndpoint for Arc<T> {
    fn handle(&self, method: &str, handler: Handler) -> Result<(), ProtocolError> {
        (**self).handle(method, handler)
    }
}

impl<T: ClientEndpoint + ?Sized> ClientEndpoint for Arc<T> {
    fn dispatch_sync(&self, method: &str, payload: Vec<u8>) -> Result<Vec<u8>, DispatchError> {
        (**self).dispatch_sync(method, payload)
    }
}

/// In-process transport: dispatch runs the registered handler on the
/// calling thread.
#[derive(Default)]
pub struct LoopbackEndpoint {
    handlers: RwLock<HashMap<String, Handler>>,
}

impl LoopbackEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the registered operation names, sorted.
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<_> = self.handlers.read().keys().cloned().collect();
        methods.sort();
        methods
    }
}

impl ServerEndpoint for LoopbackEndpoint {
    fn handle(&self, method: &str, handler: Handler) -> Result<(), ProtocolError> {
        let mut handlers = self.handlers.write();
        if handlers.contains_key(method) {
            return Err(ProtocolError::DuplicateHandler(method.to_string()));
        }
        handlers.insert(method.to_string(), handler);
        Ok(())
    }
}

impl ClientEndpoint for LoopbackEndpoint {
    fn dispatch_sync(&self, method: &str, payload: Vec<u8>) -> Result<Vec<u8>, DispatchError> {
        // Release the lock before running the handler so handlers may dispatch.
        let handler = self.handlers.read().get(method).cloned();
        match handler {
            Some(handler) => handler(&payload).map_err(DispatchError::Remote),
            None => Err(DispatchError::Remote(RpcError::unknown_operation(method))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn echo() -> Handler {
        Arc::new(|payload: &[u8]| Ok(payload.to_vec()))
    }

    #[test]
    fn test_loopback_dispatch() {
        let endpoint = LoopbackEndpoint::new();
        endpoint.handle("Echo", echo()).unwrap();

        let reply = endpoint.dispatch_sync("Echo", b"hello".to_vec()).unwrap();
        assert_eq!(reply, b"hello");
    }

    #[test]
    fn test_unregistered_operation() {
        let endpoint = LoopbackEndpoint::new();
        let err = endpoint.dispatch_sync("Missing", Vec::new()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UnknownOperation));
    }

    #[test]
    fn test_duplicate_registration() {
        let endpoint = LoopbackEndpoint::new();
        endpoint.handle("Echo", echo()).unwrap();
        let err = endpoint.handle("Echo", echo()).unwrap_err();
        assert!(matches!(err, ProtocolError::DuplicateHandler(name) if name == "Echo"));
    }

    #[test]
    fn test_handler_error_is_remote() {
        let endpoint = LoopbackEndpoint::new();
        endpoint
            .handle(
                "Fail",
                Arc::new(|_: &[u8]| Err(RpcError::improper_message("bad input"))),
            )
            .unwrap();

        match endpoint.dispatch_sync("Fail", Vec::new()).unwrap_err() {
            DispatchError::Remote(err) => {
                assert_eq!(err.code, ErrorCode::ImproperMessage);
                assert_eq!(err.message, "bad input");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_methods_listing() {
        let endpoint = Arc::new(LoopbackEndpoint::new());
        endpoint.handle("B", echo()).unwrap();
        endpoint.handle("A", echo()).unwrap();
        assert_eq!(endpoint.methods(), vec!["A", "B"]);
    }

    #[test]
    fn test_concurrent_dispatch() {
        let endpoint = Arc::new(LoopbackEndpoint::new());
        endpoint.handle("Echo", echo()).unwrap();

        let threads: Vec<_> = (0..8u8)
            .map(|i| {
                let endpoint = Arc::clone(&endpoint);
                std::thread::spawn(move || endpoint.dispatch_sync("Echo", vec![i]).unwrap())
            })
            .collect();

        for (i, thread) in threads.into_iter().enumerate() {
            assert_eq!(thread.join().unwrap(), vec![i as u8]);
        }
    }
}
