//! Audit recording of rejected and failed calls.
//!
//! Adapters write exactly one record per Improper Message and per Error
//! Condition. Successful calls are never audited.

use crate::metrics::Metrics;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Classification of an audited failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditKind {
    /// The payload did not decode into the operation's request shape.
    ImproperMessage,
    /// A well-formed request was rejected, or its result failed to encode.
    ErrorCondition,
}

impl AuditKind {
    /// Metric label for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::ImproperMessage => "improper_message",
            AuditKind::ErrorCondition => "error_condition",
        }
    }
}

/// One audit entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub kind: AuditKind,
    pub method: String,
    pub error: String,
    /// The raw input (Improper Message) or the decoded request (Error Condition).
    pub data: String,
}

impl fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            AuditKind::ImproperMessage => "Improper message.",
            AuditKind::ErrorCondition => "Error condition.",
        };
        write!(
            f,
            "{} method: {} err: {} data: {}",
            prefix, self.method, self.error, self.data
        )
    }
}

/// Sink for audit records.
pub trait AuditLog: Send + Sync {
    fn audit(&self, record: &AuditRecord);
}

/// Writes audit records as `tracing` warnings under the `carpc::audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn audit(&self, record: &AuditRecord) {
        tracing::warn!(
            target: "carpc::audit",
            kind = record.kind.as_str(),
            method = %record.method,
            "{}",
            record
        );
    }
}

/// Keeps audit records in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn count(&self, kind: AuditKind) -> usize {
        self.records.lock().iter().filter(|r| r.kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl AuditLog for MemoryAuditLog {
    fn audit(&self, record: &AuditRecord) {
        self.records.lock().push(record.clone());
    }
}

/// Audit sink plus the metric counter that tracks it.
#[derive(Clone)]
pub struct Auditor {
    log: Arc<dyn AuditLog>,
    metrics: Option<Arc<Metrics>>,
}

impl Auditor {
    pub fn new(log: Arc<dyn AuditLog>, metrics: Option<Arc<Metrics>>) -> Self {
        Self { log, metrics }
    }

    fn record(&self, record: AuditRecord) {
        if let Some(ref metrics) = self.metrics {
            metrics
                .audit_records_total
                .with_label_values(&[record.method.as_str(), record.kind.as_str()])
                .inc();
        }
        self.log.audit(&record);
    }

    /// Records a payload that failed to decode.
    pub fn improper_message(&self, method: &str, err: &dyn fmt::Display, raw: &[u8]) {
        self.record(AuditRecord {
            kind: AuditKind::ImproperMessage,
            method: method.to_string(),
            error: err.to_string(),
            data: render_raw(raw),
        });
    }

    /// Records a failure of a well-formed request.
    pub fn error_condition(&self, method: &str, err: &dyn fmt::Display, request: &dyn fmt::Debug) {
        self.record(AuditRecord {
            kind: AuditKind::ErrorCondition,
            method: method.to_string(),
            error: err.to_string(),
            data: format!("{:?}", request),
        });
    }
}

/// Renders raw input as text when it is UTF-8, otherwise as hex.
fn render_raw(raw: &[u8]) -> String {
    match std::str::from_utf8(raw) {
        Ok(text) => text.to_string(),
        Err(_) => format!("0x{}", hex::encode(raw)),
    }
}
