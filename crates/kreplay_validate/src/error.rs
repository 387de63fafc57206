//! Validation errors.

use kreplay_capture::CaptureError;
use std::path::PathBuf;

/// Validation result type
pub type ValidateResult<T> = Result<T, ValidateError>;

/// Conditions that prevent validation from producing a report
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidateError {
    /// Reading the capture or listing output files failed
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// An output file could not be digested
    #[error("Cannot digest {}: {reason}", path.display())]
    Digest {
        /// File being read
        path: PathBuf,
        /// Underlying error text
        reason: String,
    },

    /// Serializing the report failed
    #[error("Cannot serialize report: {reason}")]
    Serialize {
        /// Serializer message
        reason: String,
    },
}
