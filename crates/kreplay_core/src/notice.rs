//! Non-fatal conditions accumulated during a run.

use crate::argument::Position;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A condition worth reporting that does not abort the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notice {
    /// Several buffer arguments shared one allocation at capture time
    AliasGroup {
        /// Member positions, ascending
        positions: Vec<Position>,
    },
    /// SVM binding was switched on because a non-zero offset was recorded
    SvmForced {
        /// Positions with a non-zero offset
        positions: Vec<Position>,
    },
    /// An image type code was not recognized
    ImageTypeFallback {
        /// Image position
        position: Position,
        /// Raw code
        code: u32,
    },
    /// A device binary candidate was rejected
    BinaryRejected {
        /// Candidate file name
        candidate: String,
        /// Why it was rejected
        reason: String,
    },
    /// An optional artifact was not found
    OptionalMetadataAbsent {
        /// Artifact name
        artifact: String,
    },
    /// Replayed output differs from the captured snapshot
    ValidationMismatch {
        /// Argument position
        position: Position,
        /// Argument data type, when annotations exist
        data_type: Option<String>,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AliasGroup { positions } => write!(
                f,
                "Arguments {:?} alias one buffer; the aliasing is replicated",
                positions
            ),
            Self::SvmForced { positions } => write!(
                f,
                "Non-zero SVM offsets at {:?}; binding buffers as SVM",
                positions
            ),
            Self::ImageTypeFallback { position, code } => write!(
                f,
                "Image argument {} has unknown type code 0x{:X}; using 3-D shape",
                position, code
            ),
            Self::BinaryRejected { candidate, reason } => {
                write!(f, "Device binary {} rejected: {}", candidate, reason)
            }
            Self::OptionalMetadataAbsent { artifact } => {
                write!(f, "Optional {} not available", artifact)
            }
            Self::ValidationMismatch {
                position,
                data_type: Some(data_type),
            } => write!(
                f,
                "Argument {} is not equal, data type={}",
                position, data_type
            ),
            Self::ValidationMismatch {
                position,
                data_type: None,
            } => write!(f, "Argument {} is not equal", position),
        }
    }
}

/// Ordered collection of notices for end-of-run reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeLog {
    notices: Vec<Notice>,
}

impl NoticeLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a notice
    pub fn push(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    /// Append all notices from another log
    pub fn extend(&mut self, other: NoticeLog) {
        self.notices.extend(other.notices);
    }

    /// Notices in recording order
    #[must_use]
    pub fn as_slice(&self) -> &[Notice] {
        &self.notices
    }

    /// Number of notices
    #[must_use]
    pub fn len(&self) -> usize {
        self.notices.len()
    }

    /// Whether nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }

    /// One line per notice
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.notices.iter().map(ToString::to_string).collect()
    }
}

impl IntoIterator for NoticeLog {
    type Item = Notice;
    type IntoIter = std::vec::IntoIter<Notice>;

    fn into_iter(self) -> Self::IntoIter {
        self.notices.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mismatch_lines() {
        let with_type = Notice::ValidationMismatch {
            position: 2,
            data_type: Some("float*".to_string()),
        };
        assert_eq!(with_type.to_string(), "Argument 2 is not equal, data type=float*");

        let without = Notice::ValidationMismatch {
            position: 2,
            data_type: None,
        };
        assert_eq!(without.to_string(), "Argument 2 is not equal");
    }

    #[test]
    fn test_log_ordering() {
        let mut log = NoticeLog::new();
        assert!(log.is_empty());
        log.push(Notice::AliasGroup {
            positions: vec![0, 1],
        });
        let mut other = NoticeLog::new();
        other.push(Notice::OptionalMetadataAbsent {
            artifact: "ArgumentDataTypes.txt".to_string(),
        });
        log.extend(other);

        let lines = log.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[0, 1]"));
        assert!(lines[1].contains("ArgumentDataTypes.txt"));
    }

    #[test]
    fn test_notice_serializes() {
        let notice = Notice::ImageTypeFallback {
            position: 4,
            code: 0x99,
        };
        let json = serde_json::to_string(&notice).unwrap();
        let back: Notice = serde_json::from_str(&json).unwrap();
        assert_eq!(back, notice);
    }
}
