//! Error taxonomy for the core (spec.md §7).
//!
//! Two levels mirror the teacher's `Error<E, GPIO>` wrapping an inner SPI/GPIO
//! error: [`TransportError`] is the monomorphic discriminant transports
//! return (spec.md §4.1), and [`CoreError`] is what every layer above the
//! transport returns, with a `From<TransportError>` conversion at the seam.

use std::fmt;

use thiserror::Error;

/// Errors a [`crate::transport::Transport`] implementation can return.
///
/// Spec.md §4.1: "all methods return a monomorphic error discriminant
/// `{Io(reason), Timeout, Closed, Protocol(reason)}`."
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(String),
    #[error("operation timed out")]
    Timeout,
    #[error("transport is closed")]
    Closed,
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::TimedOut {
            TransportError::Timeout
        } else {
            TransportError::Io(e.to_string())
        }
    }
}

/// The unified error type returned by every layer above the transport.
///
/// Variant-per-kind, matching spec.md §7's taxonomy exactly: `Io`, `Framing`,
/// `Protocol` (device-reported error code + message), `Semantic`,
/// `Interrupt`, `Resource`.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying transport failure (read, write, timeout, closed).
    #[error("I/O error: {0}")]
    Io(String),

    /// Bad checksum, unexpected reply type, short read.
    #[error("framing error: {0}")]
    Framing(String),

    /// A well-formed reply carrying a device-side error code.
    #[error("device error {code}: {message}")]
    Protocol { code: u16, message: String },

    /// Address out of range, unsupported operation, unknown chip, etc.
    #[error("{0}")]
    Semantic(String),

    /// The user asked to cancel a long-running operation.
    #[error("interrupted")]
    Interrupt,

    /// Allocation or capacity failure (e.g. breakpoint table full).
    #[error("resource exhausted: {0}")]
    Resource(String),
}

impl From<TransportError> for CoreError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Io(s) => CoreError::Io(s),
            TransportError::Timeout => CoreError::Io("timed out".into()),
            TransportError::Closed => CoreError::Io("transport closed".into()),
            TransportError::Protocol(s) => CoreError::Framing(s),
        }
    }
}

impl CoreError {
    pub fn semantic(msg: impl Into<String>) -> Self {
        CoreError::Semantic(msg.into())
    }

    pub fn framing(msg: impl Into<String>) -> Self {
        CoreError::Framing(msg.into())
    }

    /// `true` for kinds upper layers may retry once (spec.md §7: "no silent
    /// retry except the single controlled retry inside `try_open`").
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Io(_) | CoreError::Framing(_))
    }
}

/// A chip/dongle error code plus its descriptive text, as carried by
/// [`CoreError::Protocol`].
pub struct ErrorCode(pub u16, pub &'static str);

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.1, self.0)
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
pub type TransportResult<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_converts_to_core_error() {
        let e: CoreError = TransportError::Timeout.into();
        assert!(matches!(e, CoreError::Io(_)));
        assert!(e.is_retryable());
    }

    #[test]
    fn semantic_errors_are_not_retryable() {
        assert!(!CoreError::semantic("bad chip").is_retryable());
    }
}
