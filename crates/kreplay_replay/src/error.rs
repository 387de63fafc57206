//! Replay errors.

use crate::acquire::BinaryAttempt;
use crate::device::DeviceError;
use kreplay_capture::CaptureError;
use std::path::PathBuf;

/// Replay result type
pub type ReplayResult<T> = Result<T, ReplayError>;

/// Fatal replay conditions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    /// Reading the capture failed
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// The device reported an error
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// A source or IL build failed
    #[error("Building from {tier} failed:\n{log}")]
    BuildFailed {
        /// Program tier
        tier: &'static str,
        /// Build log
        log: String,
    },

    /// Every captured device binary was rejected
    #[error("No usable device binary among {} candidates", attempts.len())]
    NoUsableBinary {
        /// Rejected attempts in order
        attempts: Vec<BinaryAttempt>,
    },

    /// Bound argument count disagrees with the kernel's declared arity
    #[error("Kernel declares {expected} arguments but the capture has {actual}")]
    ArityMismatch {
        /// Declared arity
        expected: u32,
        /// Captured argument count
        actual: usize,
    },

    /// Configuration is unusable
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong
        reason: String,
    },

    /// Writing an output file failed
    #[error("Cannot write {}: {reason}", path.display())]
    Output {
        /// Output path
        path: PathBuf,
        /// Underlying error text
        reason: String,
    },
}

impl ReplayError {
    /// Classify a build error for a single-attempt tier
    #[must_use]
    pub fn build(tier: &'static str, err: DeviceError) -> Self {
        match err {
            DeviceError::BuildFailed { log } => Self::BuildFailed { tier, log },
            other => Self::Device(other),
        }
    }

    /// Map an I/O failure on an output path
    #[must_use]
    pub fn output(path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::Output {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}
