//! Sampler argument descriptors.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sampler addressing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressingMode {
    /// `CL_ADDRESS_NONE`
    None,
    /// `CL_ADDRESS_CLAMP_TO_EDGE`
    ClampToEdge,
    /// `CL_ADDRESS_CLAMP`
    Clamp,
    /// `CL_ADDRESS_REPEAT`
    Repeat,
    /// `CL_ADDRESS_MIRRORED_REPEAT`
    MirroredRepeat,
}

impl AddressingMode {
    /// Substring patterns in match priority order.
    ///
    /// `CLAMP` is a prefix of `CLAMP_TO_EDGE` and `REPEAT` a suffix of
    /// `MIRRORED_REPEAT`, so the longer names must be tried first.
    const PATTERNS: [(&'static str, Self); 4] = [
        ("CLAMP_TO_EDGE", Self::ClampToEdge),
        ("CLAMP", Self::Clamp),
        ("MIRRORED_REPEAT", Self::MirroredRepeat),
        ("REPEAT", Self::Repeat),
    ];

    /// Runtime code
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::None => 0x1130,
            Self::ClampToEdge => 0x1131,
            Self::Clamp => 0x1132,
            Self::Repeat => 0x1133,
            Self::MirroredRepeat => 0x1134,
        }
    }
}

/// Sampler filter mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterMode {
    /// `CL_FILTER_NEAREST`
    Nearest,
    /// `CL_FILTER_LINEAR`
    Linear,
}

impl FilterMode {
    /// Runtime code
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::Nearest => 0x1140,
            Self::Linear => 0x1141,
        }
    }
}

/// Decoded sampler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SamplerDescriptor {
    /// Normalized coordinates
    pub normalized: bool,
    /// Addressing mode
    pub addressing: AddressingMode,
    /// Filter mode
    pub filter: FilterMode,
}

impl SamplerDescriptor {
    /// Decode the one-line textual sampler description written at capture.
    ///
    /// Matching is case-sensitive substring search; the first addressing
    /// pattern that matches wins.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let normalized = line.contains("TRUE");
        let addressing = AddressingMode::PATTERNS
            .iter()
            .find(|(pattern, _)| line.contains(pattern))
            .map_or(AddressingMode::None, |(_, mode)| *mode);
        let filter = if line.contains("LINEAR") {
            FilterMode::Linear
        } else {
            FilterMode::Nearest
        };
        Self {
            normalized,
            addressing,
            filter,
        }
    }
}

impl fmt::Display for SamplerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sampler normalized={} addressing={:?} filter={:?}",
            self.normalized, self.addressing, self.filter
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_description() {
        let desc = SamplerDescriptor::parse(
            "CLK_NORMALIZED_COORDS_TRUE | CLK_ADDRESS_CLAMP_TO_EDGE | CLK_FILTER_LINEAR",
        );
        assert!(desc.normalized);
        assert_eq!(desc.addressing, AddressingMode::ClampToEdge);
        assert_eq!(desc.filter, FilterMode::Linear);
    }

    #[test]
    fn test_clamp_is_not_clamp_to_edge() {
        let desc = SamplerDescriptor::parse("CLK_NORMALIZED_COORDS_FALSE | CLK_ADDRESS_CLAMP");
        assert!(!desc.normalized);
        assert_eq!(desc.addressing, AddressingMode::Clamp);
        assert_eq!(desc.filter, FilterMode::Nearest);
    }

    #[test]
    fn test_mirrored_repeat_before_repeat() {
        let desc = SamplerDescriptor::parse("CLK_ADDRESS_MIRRORED_REPEAT");
        assert_eq!(desc.addressing, AddressingMode::MirroredRepeat);
        let desc = SamplerDescriptor::parse("CLK_ADDRESS_REPEAT");
        assert_eq!(desc.addressing, AddressingMode::Repeat);
    }

    #[test]
    fn test_case_sensitive_and_default() {
        let desc = SamplerDescriptor::parse("clamp linear true");
        assert!(!desc.normalized);
        assert_eq!(desc.addressing, AddressingMode::None);
        assert_eq!(desc.filter, FilterMode::Nearest);
    }

    #[test]
    fn test_codes() {
        assert_eq!(AddressingMode::None.code(), 0x1130);
        assert_eq!(AddressingMode::MirroredRepeat.code(), 0x1134);
        assert_eq!(FilterMode::Linear.code(), 0x1141);
    }
}
