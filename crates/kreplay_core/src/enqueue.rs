//! Enqueue index of a captured invocation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The capture-time enqueue counter identifying one invocation.
///
/// File names embed it zero-padded to at least four digits; indices of
/// 10000 and above are written at their natural width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnqueueIndex(u64);

impl EnqueueIndex {
    /// Minimum width of the padded form
    pub const PAD_WIDTH: usize = 4;

    /// Wrap a raw counter value
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw counter value
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Padded form used in artifact file names
    #[must_use]
    pub fn padded(&self) -> String {
        format!("{:0width$}", self.0, width = Self::PAD_WIDTH)
    }

    /// Common file-name prefix, `Enqueue_<padded>_`
    #[must_use]
    pub fn file_prefix(&self) -> String {
        format!("Enqueue_{}_", self.padded())
    }
}

impl fmt::Display for EnqueueIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EnqueueIndex {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padding() {
        assert_eq!(EnqueueIndex::new(1).padded(), "0001");
        assert_eq!(EnqueueIndex::new(42).padded(), "0042");
        assert_eq!(EnqueueIndex::new(9999).padded(), "9999");
        assert_eq!(EnqueueIndex::new(10000).padded(), "10000");
        assert_eq!(EnqueueIndex::new(123456).padded(), "123456");
    }

    #[test]
    fn test_file_prefix() {
        assert_eq!(EnqueueIndex::new(7).file_prefix(), "Enqueue_0007_");
    }

    proptest::proptest! {
        #[test]
        fn prop_padded_parses_back(raw in 0u64..10_000_000) {
            let idx = EnqueueIndex::new(raw);
            let padded = idx.padded();
            proptest::prop_assert!(padded.len() >= EnqueueIndex::PAD_WIDTH);
            proptest::prop_assert_eq!(padded.parse::<u64>().unwrap(), raw);
        }
    }
}
