//! Replayed-versus-captured comparison.

use crate::error::ValidateResult;
use crate::report::{PositionCheck, ValidationReport};
use crate::scan::DigestSet;
use crate::types::ArgumentTypes;
use kreplay_capture::{CaptureReader, naming};
use kreplay_core::{EnqueueIndex, Notice, NoticeLog, Position};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Validator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateConfig {
    /// Replayed outputs, relative to the capture directory
    pub test_dir: PathBuf,
    /// Captured snapshots, relative to the capture directory
    pub post_dir: PathBuf,
}

impl Default for ValidateConfig {
    fn default() -> Self {
        Self {
            test_dir: PathBuf::from(naming::TEST_DIR),
            post_dir: PathBuf::from(naming::POST_DIR),
        }
    }
}

/// Compares replayed outputs against the captured post-execution state.
///
/// Validation only reads files, so running it twice gives the same report.
#[derive(Debug, Clone)]
pub struct Validator {
    root: PathBuf,
    config: ValidateConfig,
}

impl Validator {
    /// Validator for a capture directory
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config: ValidateConfig::default(),
        }
    }

    /// Create with custom config
    #[must_use]
    pub fn with_config(mut self, config: ValidateConfig) -> Self {
        self.config = config;
        self
    }

    fn dir(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    /// Validate the enqueue recorded in `enqueueNumber.txt`.
    ///
    /// # Errors
    ///
    /// Returns error if the enqueue index cannot be read or an output file
    /// cannot be digested.
    pub fn validate(&self) -> ValidateResult<ValidationReport> {
        let enqueue = CaptureReader::new(&self.root).read_enqueue_index()?;
        self.validate_enqueue(enqueue)
    }

    /// Validate one enqueue index.
    ///
    /// # Errors
    ///
    /// Returns error if an output file cannot be digested.
    pub fn validate_enqueue(&self, enqueue: EnqueueIndex) -> ValidateResult<ValidationReport> {
        let replayed = DigestSet::replayed(&self.dir(&self.config.test_dir), enqueue)?;
        let captured = DigestSet::captured(&self.dir(&self.config.post_dir), enqueue)?;

        let mut notices = NoticeLog::new();
        let types = ArgumentTypes::load(&self.root.join(naming::ARGUMENT_TYPES_FILE))?;
        if types.is_none() {
            notices.push(Notice::OptionalMetadataAbsent {
                artifact: naming::ARGUMENT_TYPES_FILE.to_string(),
            });
        }

        let positions: BTreeSet<Position> = replayed.positions().chain(captured.positions()).collect();
        let mut checks = Vec::with_capacity(positions.len());
        for position in positions {
            let ours = replayed.get(position).map(|e| e.digest);
            let theirs = captured.get(position).map(|e| e.digest);
            let equal = matches!((ours, theirs), (Some(a), Some(b)) if a == b);
            let data_type = if equal {
                None
            } else {
                types.as_ref().and_then(|t| t.get(position))
            };
            if !equal {
                tracing::warn!(position, replayed = ours.is_some(), captured = theirs.is_some(), "Output mismatch");
            }
            checks.push(PositionCheck {
                position,
                replayed: ours.map(|d| d.to_hex()),
                captured: theirs.map(|d| d.to_hex()),
                equal,
                data_type,
            });
        }

        for check in checks.iter().filter(|c| !c.equal) {
            notices.push(Notice::ValidationMismatch {
                position: check.position,
                data_type: check.data_type.clone(),
            });
        }

        let report = ValidationReport::new(enqueue, checks, notices);
        tracing::info!(
            enqueue = %enqueue,
            positions = report.checks.len(),
            verdict = ?report.verdict,
            "Validation complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Verdict;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, bytes: &[u8]) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, bytes).unwrap();
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "enqueueNumber.txt", b"1\n");
        write(dir.path(), "Test/Enqueue_0001_Kernel_foo_Arg_0_Buffer.bin", &[1, 2, 3, 4]);
        write(dir.path(), "Post/Enqueue_0001_Kernel_foo_Arg_0.bin", &[1, 2, 3, 4]);
        write(dir.path(), "Test/Enqueue_0001_Kernel_foo_Arg_1_Image.raw", &[9; 16]);
        write(dir.path(), "Post/Enqueue_0001_Kernel_foo_Arg_1.raw", &[9; 16]);
        dir
    }

    #[test]
    fn test_equal_digests() {
        let dir = fixture();
        let report = Validator::new(dir.path()).validate().unwrap();
        assert_eq!(report.verdict, Verdict::AllEqual);
        assert_eq!(report.checks.len(), 2);
        assert!(report.checks.iter().all(|c| c.equal));
        assert_eq!(
            report.notices.as_slice(),
            &[Notice::OptionalMetadataAbsent {
                artifact: "ArgumentDataTypes.txt".to_string()
            }]
        );
    }

    #[test]
    fn test_single_byte_flip() {
        let dir = fixture();
        write(dir.path(), "Post/Enqueue_0001_Kernel_foo_Arg_1.raw", &{
            let mut bytes = [9u8; 16];
            bytes[7] ^= 1;
            bytes
        });
        write(dir.path(), "ArgumentDataTypes.txt", b"int*\nimage2d_t\n");

        let report = Validator::new(dir.path()).validate().unwrap();
        assert_eq!(report.verdict, Verdict::Mismatch);
        assert_eq!(report.mismatches(), vec![1]);
        assert_eq!(report.checks[1].data_type.as_deref(), Some("image2d_t"));
        assert_eq!(
            report.notices.as_slice(),
            &[Notice::ValidationMismatch {
                position: 1,
                data_type: Some("image2d_t".to_string())
            }]
        );
    }

    #[test]
    fn test_missing_side_is_unequal() {
        let dir = fixture();
        write(dir.path(), "Post/Enqueue_0001_Kernel_foo_Arg_5.bin", &[0]);
        let report = Validator::new(dir.path()).validate().unwrap();
        let check = report.checks.iter().find(|c| c.position == 5).unwrap();
        assert!(!check.equal);
        assert!(check.replayed.is_none());
        assert!(check.captured.is_some());
    }

    #[test]
    fn test_validation_is_idempotent() {
        let dir = fixture();
        write(dir.path(), "Test/Enqueue_0001_Kernel_foo_Arg_0_Buffer.bin", &[0, 0, 0, 0]);
        let validator = Validator::new(dir.path());
        let first = validator.validate().unwrap();
        let second = validator.validate().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_custom_directories() {
        let dir = fixture();
        write(dir.path(), "out/Enqueue_0001_Kernel_foo_Arg_0_Buffer.bin", &[1, 2, 3, 4]);
        let config = ValidateConfig {
            test_dir: PathBuf::from("out"),
            post_dir: PathBuf::from("Post"),
        };
        let report = Validator::new(dir.path())
            .with_config(config)
            .validate()
            .unwrap();
        assert_eq!(report.mismatches(), vec![1]);
    }

    #[test]
    fn test_other_enqueue_ignored() {
        let dir = fixture();
        write(dir.path(), "Post/Enqueue_0002_Kernel_foo_Arg_7.bin", &[0]);
        let report = Validator::new(dir.path())
            .validate_enqueue(EnqueueIndex::new(1))
            .unwrap();
        assert_eq!(report.checks.len(), 2);
    }

    proptest::proptest! {
        #[test]
        fn prop_any_flip_is_detected(
            bytes in proptest::collection::vec(proptest::num::u8::ANY, 1..64),
            index in proptest::arbitrary::any::<proptest::sample::Index>(),
            mask in 1u8..=255,
        ) {
            let dir = TempDir::new().unwrap();
            write(dir.path(), "enqueueNumber.txt", b"1\n");
            write(dir.path(), "Test/Enqueue_0001_Kernel_k_Arg_0_Buffer.bin", &bytes);
            write(dir.path(), "Post/Enqueue_0001_Kernel_k_Arg_0.bin", &bytes);
            let validator = Validator::new(dir.path());
            proptest::prop_assert!(validator.validate().unwrap().is_equal());

            let mut flipped = bytes.clone();
            let at = index.index(flipped.len());
            flipped[at] ^= mask;
            write(dir.path(), "Post/Enqueue_0001_Kernel_k_Arg_0.bin", &flipped);
            proptest::prop_assert_eq!(validator.validate().unwrap().mismatches(), vec![0]);
        }
    }
}
