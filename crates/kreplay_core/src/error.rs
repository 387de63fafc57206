//! Core error types for kreplay.

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while interpreting captured values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// An integer field could not be parsed
    #[error("Invalid integer in {field}: {value:?}")]
    InvalidInteger {
        /// Field being parsed
        field: String,
        /// Offending text
        value: String,
    },

    /// Launch geometry is not 1, 2 or 3 dimensional, or its lines disagree
    #[error("Invalid launch geometry: {reason}")]
    InvalidGeometry {
        /// What was wrong
        reason: String,
    },

    /// Image metadata is incomplete
    #[error("Invalid image metadata: {reason}")]
    InvalidImage {
        /// What was wrong
        reason: String,
    },

    /// A position was claimed by more than one argument kind
    #[error("Argument {position} claimed as both {first} and {second}")]
    ConflictingKind {
        /// Argument position
        position: u32,
        /// Kind registered first
        first: &'static str,
        /// Kind registered second
        second: &'static str,
    },
}

impl CoreError {
    /// Shorthand for an integer parse failure
    #[must_use]
    pub fn invalid_integer(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidInteger {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Parse a decimal or `0x`-prefixed hexadecimal unsigned integer.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInteger`] naming `field` when `text` is not a number.
pub fn parse_u64(field: &str, text: &str) -> CoreResult<u64> {
    let trimmed = text.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse::<u64>(),
    };
    parsed.map_err(|_| CoreError::invalid_integer(field, trimmed))
}
