//! Error types for ringtrace operations
//!
//! Every error variant carries the context needed to act on it and maps to a
//! stable error code for logging and programmatic handling. The propagation
//! policy favors producer availability over completeness of the trace stream:
//! the only recoverable error is `NoSpace`, and the emit path swallows it by
//! dropping the event rather than blocking or retrying.

use thiserror::Error;

/// Result type alias for ringtrace operations
pub type Result<T> = std::result::Result<T, TraceError>;

/// Errors that can occur while tracing
#[derive(Error, Debug)]
pub enum TraceError {
    /// Ring buffer capacity is not a power of two, or too small for a record
    #[error("invalid ring capacity {capacity}: must be a power of two and at least {minimum} bytes")]
    InvalidCapacity { capacity: usize, minimum: usize },

    /// More tracepoints registered than the one-byte tag space allows
    #[error("too many tracepoints: {count} registered, at most {max} supported")]
    RegistrationOverflow { count: usize, max: usize },

    /// A tag with no matching descriptor. On the drain path this signals
    /// stream corruption or a codec mismatch and is fatal.
    #[error("tracepoint id {id} is not registered")]
    OutOfRange { id: u8 },

    /// The ring cannot hold the record. The event is dropped; producers
    /// must not retry synchronously.
    #[error("no space in ring buffer: record needs {required} bytes, {free} free")]
    NoSpace { required: usize, free: usize },

    /// A second drainer was requested for a context that already has one.
    /// Only one consumer may run per ring buffer.
    #[error("a consumer is already attached to this trace context")]
    ConsumerAlreadyAttached,
}

impl TraceError {
    /// Returns true if this error might succeed on a later attempt
    ///
    /// Only `NoSpace` qualifies: the consumer frees space as it drains.
    /// Everything else is a configuration or corruption failure that a
    /// retry cannot fix.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TraceError::NoSpace { .. })
    }

    /// Returns the stable error code for this error
    ///
    /// Codes are uppercase, underscore-separated identifiers that remain
    /// stable across versions; use them for logging and alerting.
    pub fn error_code(&self) -> &'static str {
        match self {
            TraceError::InvalidCapacity { .. } => "INVALID_CAPACITY",
            TraceError::RegistrationOverflow { .. } => "REGISTRATION_OVERFLOW",
            TraceError::OutOfRange { .. } => "OUT_OF_RANGE",
            TraceError::NoSpace { .. } => "NO_SPACE",
            TraceError::ConsumerAlreadyAttached => "CONSUMER_ALREADY_ATTACHED",
        }
    }
}
