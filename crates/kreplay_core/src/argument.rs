//! Kernel argument records.
//!
//! Every argument position carries exactly one [`ArgumentKind`], resolved
//! once while the capture is read. Positions no discovery pass claims are
//! scalars.

use crate::error::{CoreError, CoreResult};
use crate::image::ImageDescriptor;
use crate::sampler::SamplerDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A kernel's 0-based argument slot
pub type Position = u32;

/// The kind of one argument together with its payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgumentKind {
    /// Plain value, bound verbatim
    Scalar {
        /// Raw argument bytes
        bytes: Vec<u8>,
    },
    /// Device buffer
    Buffer {
        /// Device pointer recorded at capture, compared as opaque bytes
        identity: Option<Vec<u8>>,
        /// Buffer content before the captured enqueue
        pre_state: Vec<u8>,
    },
    /// Shared virtual memory region, bound at a byte offset
    Svm {
        /// Allocation identity recorded at capture
        identity: Option<Vec<u8>>,
        /// Allocation content before the captured enqueue
        pre_state: Vec<u8>,
        /// Byte offset of this argument into the allocation
        offset: u64,
    },
    /// Device image
    Image {
        /// Allocation parameters
        descriptor: ImageDescriptor,
        /// Image content before the captured enqueue
        pre_state: Vec<u8>,
    },
    /// Sampler object
    Sampler {
        /// Decoded sampler state
        descriptor: SamplerDescriptor,
    },
    /// Uninitialized local memory of a fixed size
    Local {
        /// Size in bytes
        size: u64,
    },
}

impl ArgumentKind {
    /// Short kind name used in reports
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Scalar { .. } => "scalar",
            Self::Buffer { .. } => "buffer",
            Self::Svm { .. } => "svm",
            Self::Image { .. } => "image",
            Self::Sampler { .. } => "sampler",
            Self::Local { .. } => "local",
        }
    }

    /// Pre-execution content, for kinds that have host-visible memory
    #[must_use]
    pub fn pre_state(&self) -> Option<&[u8]> {
        match self {
            Self::Buffer { pre_state, .. }
            | Self::Svm { pre_state, .. }
            | Self::Image { pre_state, .. } => Some(pre_state),
            _ => None,
        }
    }

    /// Whether the argument produces an output file after replay
    #[must_use]
    pub fn has_output(&self) -> bool {
        self.pre_state().is_some()
    }
}

/// One positional argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentRecord {
    /// Slot index
    pub position: Position,
    /// Kind and payload
    pub kind: ArgumentKind,
}

/// All arguments of one invocation, keyed by position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgumentTable {
    records: BTreeMap<Position, ArgumentKind>,
}

impl ArgumentTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a position for a non-scalar kind.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ConflictingKind`] if the position is already claimed.
    pub fn claim(&mut self, position: Position, kind: ArgumentKind) -> CoreResult<()> {
        if let Some(existing) = self.records.get(&position) {
            return Err(CoreError::ConflictingKind {
                position,
                first: existing.name(),
                second: kind.name(),
            });
        }
        self.records.insert(position, kind);
        Ok(())
    }

    /// Register a scalar for a position unless another kind already owns it.
    ///
    /// Returns `true` if the scalar was inserted.
    pub fn offer_scalar(&mut self, position: Position, bytes: Vec<u8>) -> bool {
        if self.records.contains_key(&position) {
            return false;
        }
        self.records.insert(position, ArgumentKind::Scalar { bytes });
        true
    }

    /// Look up one position
    #[must_use]
    pub fn get(&self, position: Position) -> Option<&ArgumentKind> {
        self.records.get(&position)
    }

    /// Iterate in ascending position order
    pub fn iter(&self) -> impl Iterator<Item = (Position, &ArgumentKind)> {
        self.records.iter().map(|(pos, kind)| (*pos, kind))
    }

    /// Owned records in position order
    #[must_use]
    pub fn records(&self) -> Vec<ArgumentRecord> {
        self.iter()
            .map(|(position, kind)| ArgumentRecord {
                position,
                kind: kind.clone(),
            })
            .collect()
    }

    /// Number of arguments
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no argument was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether positions form the contiguous range `0..len`
    #[must_use]
    pub fn is_contiguous(&self) -> bool {
        self.records
            .keys()
            .enumerate()
            .all(|(i, pos)| *pos as usize == i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(bytes: &[u8]) -> ArgumentKind {
        ArgumentKind::Buffer {
            identity: None,
            pre_state: bytes.to_vec(),
        }
    }

    #[test]
    fn test_scalar_only_fills_unclaimed_positions() {
        let mut table = ArgumentTable::new();
        table.claim(1, buffer(&[0; 16])).unwrap();

        assert!(table.offer_scalar(0, vec![1, 0, 0, 0]));
        assert!(!table.offer_scalar(1, vec![0xAA; 8]));

        assert_eq!(table.get(0).unwrap().name(), "scalar");
        assert_eq!(table.get(1).unwrap().name(), "buffer");
        assert!(table.is_contiguous());
    }

    #[test]
    fn test_double_claim_rejected() {
        let mut table = ArgumentTable::new();
        table.claim(3, buffer(&[])).unwrap();
        let err = table
            .claim(3, ArgumentKind::Local { size: 64 })
            .unwrap_err();
        assert_eq!(
            err,
            CoreError::ConflictingKind {
                position: 3,
                first: "buffer",
                second: "local"
            }
        );
    }

    #[test]
    fn test_records_follow_position_order() {
        let mut table = ArgumentTable::new();
        table.claim(2, ArgumentKind::Local { size: 4 }).unwrap();
        table.claim(0, buffer(&[1])).unwrap();
        table.offer_scalar(1, vec![9]);

        let order: Vec<_> = table.iter().map(|(p, _)| p).collect();
        assert_eq!(order, vec![0, 1, 2]);
        let records = table.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].position, 2);
        assert_eq!(records[2].kind, ArgumentKind::Local { size: 4 });
    }

    #[test]
    fn test_gap_is_not_contiguous() {
        let mut table = ArgumentTable::new();
        table.offer_scalar(0, vec![]);
        table.offer_scalar(2, vec![]);
        assert!(!table.is_contiguous());
    }

    #[test]
    fn test_pre_state_access() {
        assert_eq!(buffer(&[5, 6]).pre_state(), Some(&[5u8, 6][..]));
        assert!(ArgumentKind::Local { size: 1 }.pre_state().is_none());
        assert!(!ArgumentKind::Scalar { bytes: vec![] }.has_output());
    }
}
