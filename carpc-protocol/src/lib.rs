//! # carpc-protocol
//!
//! Wire layer shared by carpc servers and clients.
//!
//! This crate provides:
//! - The operation catalog and per-role encoding policies
//! - The envelope codec (structured JSON, raw bytes, single-byte flags)
//! - Stable error codes carried in error replies
//! - The `ServerEndpoint`/`ClientEndpoint` transport traits and an
//!   in-process loopback transport
//! - Binary framing with CRC32C validation for the TCP transport

pub mod catalog;
pub mod codec;
pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod frame;

pub use catalog::{Encoding, Method, OperationSpec, Role};
pub use codec::{Codec, WireFormat};
pub use endpoint::{ClientEndpoint, Handler, LoopbackEndpoint, ServerEndpoint};
pub use error::{DispatchError, ErrorCode, ProtocolError, RpcError};
pub use frame::{Frame, FrameDecoder, FrameFlags, FRAME_HEADER_SIZE, MAGIC};

/// Protocol version supported by this implementation.
pub const PROTOCOL_VERSION: u16 = 1;

/// Default port for a carpc role server.
pub const DEFAULT_PORT: u16 = 7411;

/// Maximum frame body size (16 MiB).
pub const MAX_BODY_SIZE: u32 = 16 * 1024 * 1024;
