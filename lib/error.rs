//! Error types shared across the crate.

use thiserror::Error;

/// All contract violations surfaced by this crate.
///
/// Every variant is raised synchronously at the call that violates the
/// contract; nothing is retried internally, and constructors never leave a
/// partially mutated cache or state behind on failure.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// A basis was requested for a non-positive Hilbert dimension.
    #[error("invalid Hilbert dimension {0}; must be at least 1")]
    InvalidDimension(usize),

    /// A tensor's rank or shape does not match the declared subsystem
    /// dimensions.
    #[error("tensor shape mismatch: expected {expected:?}, got {got:?}")]
    Shape { expected: Vec<usize>, got: Vec<usize> },

    /// Subsystem counts or basis-tuple lengths disagree across the inputs of
    /// an algebra or composition call.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// A subsystem or basis-element index argument is outside the valid
    /// range.
    #[error("index {index} out of range for size {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// A size-bounded dense operation was invoked on a state exceeding the
    /// backend's supported subsystem count.
    #[error("capacity exceeded: {qubits} qubits requested, backend supports \
        at most {max}")]
    CapacityExceeded { qubits: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
