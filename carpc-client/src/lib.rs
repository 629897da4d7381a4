//! # carpc-client
//!
//! Client side of the carpc RPC layer.
//!
//! This crate provides:
//! - Remote stubs implementing the four authority traits over any
//!   `ClientEndpoint`
//! - An async TCP connection with concurrent in-flight calls
//! - `TcpClientEndpoint`, a blocking `ClientEndpoint` for synchronous callers

pub mod connection;
pub mod error;
pub mod stub;

pub use connection::{Connection, ConnectionConfig, TcpClientEndpoint};
pub use error::ClientError;
pub use stub::{
    client_error, CertificateAuthorityClient, RegistrationAuthorityClient,
    StorageAuthorityClient, ValidationAuthorityClient,
};
