//! # carpc-server
//!
//! Server side of the carpc RPC layer.
//!
//! This crate provides:
//! - Service adapters that expose an authority implementation over any
//!   `ServerEndpoint`
//! - Audit recording of Improper Messages and Error Conditions
//! - The TCP transport with per-call concurrency and idle timeouts
//! - Prometheus metrics and the metrics HTTP endpoint
//! - YAML/environment configuration

pub mod adapter;
pub mod audit;
pub mod config;
pub mod error;
pub mod metrics;
pub mod server;

pub use adapter::AdapterContext;
pub use audit::{AuditKind, AuditLog, AuditRecord, Auditor, MemoryAuditLog, TracingAuditLog};
pub use config::{Config, ConfigError, MetricsConfig, NetworkConfig};
pub use error::ServerError;
pub use metrics::{run_metrics_server, Metrics};
pub use server::{serve, RpcServer, ServerConfig, ServerStats};
