//! Error types for traffic-control operations.

use std::fmt;

/// Result type for traffic-control operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or querying traffic control.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input rejected at the edge (bad handle, unparsable
    /// bandwidth, missing priority, empty device name). No state change.
    #[error("validation error: {0}")]
    Validation(String),

    /// An aggregate rule was violated (unknown parent, duplicate handle,
    /// rate above ceil, sibling rates above the parent ceiling). No event
    /// is persisted.
    #[error("domain invariant violated: {0}")]
    Domain(String),

    /// Version mismatch on event-store append. The command handler retries
    /// once; a second conflict surfaces this error.
    #[error("concurrency conflict on {aggregate_id}: expected version {expected}, store at {actual}")]
    ConcurrencyConflict {
        /// Aggregate whose stream was contended.
        aggregate_id: String,
        /// Version the writer loaded.
        expected: u64,
        /// Version the store holds.
        actual: u64,
    },

    /// The kernel adapter refused or failed an apply. The intent event is
    /// already persisted; a compensating `*ApplyFailed` event records the
    /// failure.
    #[error("kernel apply failed: {operation}: {message}")]
    KernelApply {
        /// The operation that failed (e.g. "qdisc add 1:0 on eth0").
        operation: String,
        /// Adapter-reported failure message.
        message: String,
    },

    /// Query target absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// No handler registered on a bus for this message type.
    #[error("no handler registered for {0}")]
    NoHandler(&'static str),

    /// One or more event subscribers failed during fan-out. Siblings keep
    /// advancing; the individual failures are collected here.
    #[error("event fan-out failed: {0}")]
    Fanout(FanoutErrors),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a domain-invariant error.
    pub fn domain(message: impl Into<String>) -> Self {
        Self::Domain(message.into())
    }

    /// Create a kernel-apply error.
    pub fn kernel_apply(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::KernelApply {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Check if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }

    /// Check if this error was raised before any state change (input
    /// validation or an aggregate rule).
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Domain(_))
    }
}

/// Collected per-subscriber failures from an event-bus fan-out.
///
/// Dispatch never stops at the first failing subscriber; everything that
/// failed ends up here, keyed by subscriber name.
#[derive(Debug, Default)]
pub struct FanoutErrors(pub Vec<(String, Error)>);

impl FanoutErrors {
    /// Number of failed subscribers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no subscriber failed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FanoutErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, err)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{name}: {err}")?;
        }
        Ok(())
    }
}
