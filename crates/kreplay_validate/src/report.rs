//! Validation report.

use crate::error::{ValidateError, ValidateResult};
use kreplay_core::{EnqueueIndex, Notice, NoticeLog, Position};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    /// Every compared position matched
    AllEqual,
    /// At least one position differs or is missing on one side
    Mismatch,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllEqual => write!(f, "Replayed kernel produces identical results."),
            Self::Mismatch => write!(
                f,
                "Replayed kernel differs from the captured results. Floating-point \
                 operations may have been reordered; check whether the differences \
                 are significant."
            ),
        }
    }
}

/// Comparison of one argument position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionCheck {
    /// Argument position
    pub position: Position,
    /// Replayed output digest, hex
    pub replayed: Option<String>,
    /// Captured snapshot digest, hex
    pub captured: Option<String>,
    /// Whether both digests exist and are equal
    pub equal: bool,
    /// Declared data type, when annotations exist
    pub data_type: Option<String>,
}

impl PositionCheck {
    /// One-line report
    #[must_use]
    pub fn line(&self) -> String {
        if self.equal {
            format!("Check: Argument {} is equal.", self.position)
        } else {
            let notice = Notice::ValidationMismatch {
                position: self.position,
                data_type: self.data_type.clone(),
            };
            format!("Check: {notice}!")
        }
    }
}

/// Result of validating one enqueue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Enqueue index validated
    pub enqueue: EnqueueIndex,
    /// Per-position checks, ascending
    pub checks: Vec<PositionCheck>,
    /// Overall outcome
    pub verdict: Verdict,
    /// Non-fatal conditions
    pub notices: NoticeLog,
}

impl ValidationReport {
    /// Assemble a report, deriving the verdict from `checks`
    #[must_use]
    pub fn new(enqueue: EnqueueIndex, checks: Vec<PositionCheck>, notices: NoticeLog) -> Self {
        let verdict = if checks.iter().all(|c| c.equal) {
            Verdict::AllEqual
        } else {
            Verdict::Mismatch
        };
        Self {
            enqueue,
            checks,
            verdict,
            notices,
        }
    }

    /// Positions that differ
    #[must_use]
    pub fn mismatches(&self) -> Vec<Position> {
        self.checks
            .iter()
            .filter(|c| !c.equal)
            .map(|c| c.position)
            .collect()
    }

    /// Whether every position matched
    #[must_use]
    pub fn is_equal(&self) -> bool {
        self.verdict == Verdict::AllEqual
    }

    /// Notices, one line per check, then the verdict
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let mut lines = self.notices.lines();
        lines.extend(self.checks.iter().map(PositionCheck::line));
        lines.push(self.verdict.to_string());
        lines
    }

    /// Pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_json(&self) -> ValidateResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ValidateError::Serialize {
            reason: e.to_string(),
        })
    }
}
