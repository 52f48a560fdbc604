//! Error types
//!
//! Construction invariants and deserialization failures. The invariant
//! messages are fixed constants so callers and tests can match on them.

use thiserror::Error;

/// Message of the zero-length worker buffer invariant.
pub const ERROR_WORKER_SIZE: &str = "Worker cannot have a zero length buffer";

/// Message of the zero-worker scheduler invariant.
pub const ERROR_NO_WORKERS: &str = "Scheduler has NO workers";

/// Message of the unknown serialized element type error.
pub const ERROR_UNKNOWN_ELEMENT: &str = "Type not one of timer-pulse-alarm";

/// Message of the panic raised when a timer is asked to tick past zero.
pub const ERROR_TICK_BEYOND_ZERO: &str = "Timers cannot tick beyond zero";

/// Errors surfaced by fallible construction and deserialization.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// A buffered worker was constructed with `max_len == 0`.
    #[error("{}", ERROR_WORKER_SIZE)]
    ZeroLengthBuffer,

    /// A scheduler was constructed with a worker count of zero.
    #[error("{}", ERROR_NO_WORKERS)]
    NoWorkers,

    /// A serialized element does not carry a recognized type tag.
    #[error("{}", ERROR_UNKNOWN_ELEMENT)]
    UnknownElement(String),

    /// The element type is reserved but has no implementation yet.
    #[error("{0} elements are not supported")]
    UnsupportedElement(&'static str),

    /// A timer element has missing, unparsable or inconsistent fields.
    #[error("malformed timer element: {0}")]
    MalformedElement(String),
}
