//! Optional argument data type annotations.

use kreplay_capture::{CaptureError, reader};
use kreplay_core::Position;
use std::path::Path;

/// Per-position data type tokens, line N describing argument N
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentTypes {
    lines: Vec<Vec<String>>,
}

impl ArgumentTypes {
    /// Parse annotation text
    #[must_use]
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text
                .lines()
                .map(|line| line.split_whitespace().map(str::to_string).collect())
                .collect(),
        }
    }

    /// Load annotations, `Ok(None)` when the file does not exist
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read.
    pub fn load(path: &Path) -> Result<Option<Self>, CaptureError> {
        match reader::read_text(path) {
            Ok(text) => Ok(Some(Self::parse(&text))),
            Err(CaptureError::MissingArtifact { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Data type of a position, tokens joined by single spaces
    #[must_use]
    pub fn get(&self, position: Position) -> Option<String> {
        self.lines
            .get(position as usize)
            .filter(|tokens| !tokens.is_empty())
            .map(|tokens| tokens.join(" "))
    }
}
