//! Engine error types

use thiserror::Error;

/// Errors raised while building or loading a simulation.
///
/// Stepping itself never fails: once a [`crate::Config`] has been validated
/// every per-frame operation is total.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A configuration value is out of range. The run must not start.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A field array does not match the grid shape.
    #[error("dimension mismatch: expected shape {expected:?}, found {found:?}")]
    DimensionMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
