use std::path::PathBuf;
use thiserror::Error;

/// Error types for the pestlin-rs library.
#[derive(Error, Debug)]
pub enum PestError {
    /// A required file (control, residual, parameter or record file) does not exist.
    #[error("File not found: {}", path.display())]
    MissingFile { path: PathBuf },

    /// Malformed control-file text: header mismatch, bad token, premature end of input.
    #[error("Format error in {source_name}, section '{section}', line {line}: {message}")]
    Format {
        source_name: String,
        section: String,
        line: usize,
        message: String,
    },

    /// A name lookup failed: unknown parameter, observation or group.
    #[error("Referential error: {0}")]
    Referential(String),

    /// The request cannot be satisfied by the current tables or matrices.
    #[error("Structural error: {0}")]
    Structural(String),

    /// Error indicating a mismatch in matrix dimensions.
    #[error("Matrix dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Linear algebra error, e.g. a singular matrix.
    #[error("Linear algebra error: {0}")]
    LinearAlgebra(String),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Prior-information equation error.
    #[error("Equation error: {0}")]
    Equation(#[from] crate::pst::prior::EquationError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PestError {
    pub(crate) fn referential(message: impl Into<String>) -> Self {
        PestError::Referential(message.into())
    }

    pub(crate) fn structural(message: impl Into<String>) -> Self {
        PestError::Structural(message.into())
    }
}

/// Result type alias for pestlin-rs operations.
pub type Result<T> = std::result::Result<T, PestError>;
