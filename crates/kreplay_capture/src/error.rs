//! Capture reading errors.

use kreplay_core::{CoreError, Position};
use std::path::{Path, PathBuf};

/// Capture result type
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Fatal conditions while reading a capture directory
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// A required artifact is absent
    #[error("Missing artifact: {}", path.display())]
    MissingArtifact {
        /// Expected path or pattern
        path: PathBuf,
    },

    /// An artifact exists but could not be read
    #[error("IO error on {}: {reason}", path.display())]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error text
        reason: String,
    },

    /// An artifact's content could not be decoded
    #[error("Malformed artifact {}: {source}", path.display())]
    Malformed {
        /// File being decoded
        path: PathBuf,
        /// Decoding failure
        #[source]
        source: CoreError,
    },

    /// Two files claim the same argument position for the same kind
    #[error("Duplicate artifacts for argument {position}: {} and {}", first.display(), second.display())]
    DuplicateArtifact {
        /// Argument position
        position: Position,
        /// File seen first
        first: PathBuf,
        /// File seen second
        second: PathBuf,
    },
}

impl CaptureError {
    /// Build a missing-artifact error
    #[must_use]
    pub fn missing(path: impl Into<PathBuf>) -> Self {
        Self::MissingArtifact { path: path.into() }
    }

    /// Build a decoding error for `path`
    #[must_use]
    pub fn malformed(path: &Path, source: CoreError) -> Self {
        Self::Malformed {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Map an I/O error, turning `NotFound` into [`CaptureError::MissingArtifact`]
    #[must_use]
    pub fn from_io(path: &Path, err: &std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::missing(path)
        } else {
            Self::Io {
                path: path.to_path_buf(),
                reason: err.to_string(),
            }
        }
    }
}
