//! Diagnostic sink for internal faults
//!
//! Nothing inside the tracker is allowed to fail outward. Faults are caught where
//! they happen, turned into a [`Diagnostic`] and handed to a [`DiagnosticSink`]
//! supplied by the host. The default sink discards them; [`TracingSink`] logs
//! them and [`RecordingSink`] keeps them for inspection.

use std::cell::RefCell;

use crate::error::Error;

/// Failure taxonomy surfaced to diagnostic sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Persistence read or write failed
    StorageUnavailable,
    /// A performance signal source is absent in this host
    SignalUnsupported,
    /// A beacon could not be submitted
    TransportFailure,
    /// An event could not be composed because no session exists
    SessionNotReady,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::StorageUnavailable => "storage_unavailable",
            FailureKind::SignalUnsupported => "signal_unsupported",
            FailureKind::TransportFailure => "transport_failure",
            FailureKind::SessionNotReady => "session_not_ready",
        }
    }

    /// Classify a library error.
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::Database(_) | Error::StorageUnavailable(_) | Error::Io(_) => {
                FailureKind::StorageUnavailable
            }
            Error::SessionNotReady | Error::Destroyed => FailureKind::SessionNotReady,
            Error::Transport(_) | Error::Json(_) | Error::Config(_) => {
                FailureKind::TransportFailure
            }
        }
    }
}

/// A single internal fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: FailureKind,
    /// Operation that observed the fault (e.g. "session.refresh")
    pub operation: &'static str,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: FailureKind, operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation,
            message: message.into(),
        }
    }

    pub fn from_error(operation: &'static str, error: &Error) -> Self {
        Self::new(FailureKind::from_error(error), operation, error.to_string())
    }
}

/// Receiver of internal faults.
pub trait DiagnosticSink {
    fn report(&self, diagnostic: Diagnostic);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn report(&self, _diagnostic: Diagnostic) {}
}

/// Forwards diagnostics to `tracing` at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        tracing::warn!(
            kind = diagnostic.kind.as_str(),
            operation = diagnostic.operation,
            "{}",
            diagnostic.message
        );
    }
}

/// Keeps every diagnostic in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    entries: RefCell<Vec<Diagnostic>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All diagnostics recorded so far
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.borrow().clone()
    }

    /// Number of diagnostics of the given kind
    pub fn count(&self, kind: FailureKind) -> usize {
        self.entries.borrow().iter().filter(|d| d.kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl DiagnosticSink for RecordingSink {
    fn report(&self, diagnostic: Diagnostic) {
        self.entries.borrow_mut().push(diagnostic);
    }
}

/// Report a fault, mirroring it to the debug log.
pub(crate) fn report(sink: &dyn DiagnosticSink, diagnostic: Diagnostic) {
    tracing::debug!(
        kind = diagnostic.kind.as_str(),
        operation = diagnostic.operation,
        message = %diagnostic.message,
        "Telemetry fault"
    );
    sink.report(diagnostic);
}

/// Report a library error observed during `operation`.
pub(crate) fn report_error(sink: &dyn DiagnosticSink, operation: &'static str, error: &Error) {
    report(sink, Diagnostic::from_error(operation, error));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert_eq!(
            FailureKind::from_error(&Error::StorageUnavailable("quota".into())),
            FailureKind::StorageUnavailable
        );
        assert_eq!(
            FailureKind::from_error(&Error::Transport("offline".into())),
            FailureKind::TransportFailure
        );
        assert_eq!(
            FailureKind::from_error(&Error::SessionNotReady),
            FailureKind::SessionNotReady
        );
    }

    #[test]
    fn test_recording_sink_counts_by_kind() {
        let sink = RecordingSink::new();
        assert!(sink.is_empty());

        report_error(&sink, "session.refresh", &Error::StorageUnavailable("full".into()));
        report(
            &sink,
            Diagnostic::new(FailureKind::SignalUnsupported, "metrics.subscribe", "longtask"),
        );

        assert_eq!(sink.count(FailureKind::StorageUnavailable), 1);
        assert_eq!(sink.count(FailureKind::SignalUnsupported), 1);
        assert_eq!(sink.entries()[0].operation, "session.refresh");
        assert_eq!(sink.entries()[0].message, "storage unavailable: full");
    }
}
