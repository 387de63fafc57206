//! Launch geometry of a captured enqueue.

use crate::error::{CoreError, CoreResult, parse_u64};
use serde::{Deserialize, Serialize};

/// Global size, local size and global offset of one launch.
///
/// All three vectors have the same length, which is the work dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchGeometry {
    global: Vec<u64>,
    local: Vec<u64>,
    offset: Vec<u64>,
}

impl LaunchGeometry {
    /// Highest supported work dimension
    pub const MAX_DIMENSIONS: usize = 3;

    /// Build a geometry from its three component vectors
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidGeometry`] if the global size has no or more
    /// than three components, or if local size and offset disagree with it.
    pub fn new(global: Vec<u64>, local: Vec<u64>, offset: Vec<u64>) -> CoreResult<Self> {
        let dims = global.len();
        if dims == 0 || dims > Self::MAX_DIMENSIONS {
            return Err(CoreError::InvalidGeometry {
                reason: format!("global size has {} components, expected 1 to 3", dims),
            });
        }
        for (name, line) in [("local size", &local), ("global offset", &offset)] {
            if line.len() != dims {
                return Err(CoreError::InvalidGeometry {
                    reason: format!(
                        "{} has {} components but global size has {}",
                        name,
                        line.len(),
                        dims
                    ),
                });
            }
        }
        Ok(Self {
            global,
            local,
            offset,
        })
    }

    /// Parse the three-line geometry text: global, local, offset.
    ///
    /// # Errors
    ///
    /// Returns error if a line is missing or holds a non-integer token.
    pub fn parse(text: &str) -> CoreResult<Self> {
        let mut lines = text.lines();
        let mut next_line = |name: &str| -> CoreResult<Vec<u64>> {
            let line = lines.next().ok_or_else(|| CoreError::InvalidGeometry {
                reason: format!("missing {} line", name),
            })?;
            line.split_whitespace()
                .map(|token| parse_u64(name, token))
                .collect()
        };
        let global = next_line("global size")?;
        let local = next_line("local size")?;
        let offset = next_line("global offset")?;
        Self::new(global, local, offset)
    }

    /// Work dimension (1, 2 or 3)
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.global.len()
    }

    /// Global work size
    #[must_use]
    pub fn global(&self) -> &[u64] {
        &self.global
    }

    /// Explicit local work size, or `None` when the runtime should choose.
    ///
    /// An all-zero local size is the capture's "use default" sentinel.
    #[must_use]
    pub fn local(&self) -> Option<&[u64]> {
        if self.local.iter().all(|&c| c == 0) {
            None
        } else {
            Some(&self.local)
        }
    }

    /// Global work offset
    #[must_use]
    pub fn offset(&self) -> &[u64] {
        &self.offset
    }
}

impl std::fmt::Display for LaunchGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let local = match self.local() {
            Some(local) => format!("{:?}", local),
            None => "default".to_string(),
        };
        write!(
            f,
            "{}-D global={:?} local={} offset={:?}",
            self.dimensions(),
            self.global,
            local,
            self.offset
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_one_dimensional_default_local() {
        let geometry = LaunchGeometry::parse("256\n0\n0\n").unwrap();
        assert_eq!(geometry.dimensions(), 1);
        assert_eq!(geometry.global(), &[256]);
        assert_eq!(geometry.local(), None);
        assert_eq!(geometry.offset(), &[0]);
    }

    #[test]
    fn test_zero_local_sentinel_every_dimension() {
        for text in ["8\n0\n0\n", "8 8\n0 0\n0 0\n", "8 8 8\n0 0 0\n0 0 0\n"] {
            let geometry = LaunchGeometry::parse(text).unwrap();
            assert_eq!(geometry.local(), None, "{text:?}");
        }
    }

    #[test]
    fn test_partial_zero_local_is_explicit() {
        let geometry = LaunchGeometry::parse("64 64\n16 0\n0 0").unwrap();
        assert_eq!(geometry.local(), Some(&[16, 0][..]));
    }

    #[test]
    fn test_three_dimensional() {
        let geometry = LaunchGeometry::parse("16 8 4\n4 4 2\n1 2 3\n").unwrap();
        assert_eq!(geometry.dimensions(), 3);
        assert_eq!(geometry.local(), Some(&[4, 4, 2][..]));
        assert_eq!(geometry.offset(), &[1, 2, 3]);
    }

    #[test]
    fn test_mismatched_lines_rejected() {
        assert!(LaunchGeometry::parse("16 16\n0\n0 0\n").is_err());
        assert!(LaunchGeometry::parse("16\n0\n").is_err());
        assert!(LaunchGeometry::parse("\n0\n0\n").is_err());
        assert!(LaunchGeometry::parse("1 2 3 4\n0 0 0 0\n0 0 0 0\n").is_err());
        assert!(LaunchGeometry::parse("abc\n0\n0\n").is_err());
    }

    #[test]
    fn test_display() {
        let geometry = LaunchGeometry::parse("256\n0\n0\n").unwrap();
        assert_eq!(geometry.to_string(), "1-D global=[256] local=default offset=[0]");
    }

    proptest::proptest! {
        #[test]
        fn prop_all_zero_local_means_default(
            global in proptest::collection::vec(1u64..4096, 1..=3)
        ) {
            let zeros = vec![0u64; global.len()];
            let geometry = LaunchGeometry::new(global, zeros.clone(), zeros).unwrap();
            proptest::prop_assert!(geometry.local().is_none());
        }
    }
}
