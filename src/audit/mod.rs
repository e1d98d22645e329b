//! Process audit sink.
//!
//! Provides the [`ProcessAuditSink`] trait consumed by the process manager.
//! The bundled implementation, [`JsonlAuditWriter`], appends JSONL records
//! to daily-rotating files in `.command-gate/logs/`.

pub mod writer;

use crate::models::process::ProcessAuditEvent;

/// Receives one audit event per completed process.
///
/// Implementations must be [`Send`] and [`Sync`] to allow sharing across
/// async task boundaries via [`std::sync::Arc`]. Failures are logged by the
/// caller and never block process cleanup.
pub trait ProcessAuditSink: Send + Sync {
    /// Record a single completed-process event.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write operation fails.
    fn record(&self, event: &ProcessAuditEvent) -> crate::Result<()>;
}

pub use writer::JsonlAuditWriter;
