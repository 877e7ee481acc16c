//! Error types for GWFC.
//!
//! Setup-time failures are `Err` values; a contradiction during solving is
//! not an error but a [`RunOutcome`](crate::solver::RunOutcome) variant,
//! since the caller is expected to reset and retry.

use thiserror::Error;

/// Unified error type for all GWFC operations.
#[derive(Error, Debug)]
pub enum GwfcError {
    /// Invalid inputs: mixed directedness, a missing color value in the
    /// example graph, or a template with no image in the example graph.
    #[error("Setup error: {0}")]
    Setup(String),

    /// After pruning, no node of the target graph is covered by any
    /// template image. There is nothing to solve.
    #[error("No target node is covered by any template image")]
    EmptyCoverage,

    /// Malformed GraphML input.
    #[error("Parse error: {0}")]
    Parse(String),

    /// I/O errors (file reading and writing).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GwfcError {
    /// Creates a setup error.
    pub fn setup(message: impl Into<String>) -> Self {
        GwfcError::Setup(message.into())
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        GwfcError::Parse(message.into())
    }
}

/// Result type alias for GWFC operations.
pub type Result<T> = std::result::Result<T, GwfcError>;
