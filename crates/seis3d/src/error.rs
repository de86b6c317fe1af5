//! Engine error type.
//!
//! Configuration, I/O and schema errors are fatal and abort the run; a
//! diverging per-trace Snell solve is recovered locally by the trace
//! synthesiser and never surfaces through this type.

use thiserror::Error;

/// Errors surfaced by the forward-modelling engine.
#[derive(Debug, Error)]
pub enum SeisError {
    /// Missing or out-of-range model settings, detected before any grid is built.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// File-level failure in a sink or source.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// A requested parameter name is absent from the corner-point grid.
    #[error("parameter '{0}' is not found in the corner-point grid")]
    MissingParameter(String),

    /// The max-offset NMO probe failed to converge.
    #[error("numeric divergence: {0}")]
    NumericDivergence(String),

    /// A supplied cube does not match the (nx, ny, nzrefl) of the model.
    #[error("dimension mismatch: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        /// Required dimensions.
        expected: (usize, usize, usize),
        /// Dimensions of the offending cube.
        actual: (usize, usize, usize),
    },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SeisError>;
