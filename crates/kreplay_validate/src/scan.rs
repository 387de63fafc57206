//! Output discovery and digesting.

use crate::error::{ValidateError, ValidateResult};
use kreplay_capture::naming::{self, FilePattern};
use kreplay_capture::{CaptureError, OutputKind, reader};
use kreplay_core::{Digest, EnqueueIndex, Position};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Digest of one output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestEntry {
    /// File digested
    pub path: PathBuf,
    /// Output kind
    pub kind: OutputKind,
    /// Content digest
    pub digest: Digest,
}

/// Digests of one side of a comparison, keyed by position
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestSet {
    entries: BTreeMap<Position, DigestEntry>,
}

impl DigestSet {
    /// Digest replayed outputs under `dir`
    ///
    /// # Errors
    ///
    /// Returns error if a file cannot be read or two files share a position.
    pub fn replayed(dir: &Path, enqueue: EnqueueIndex) -> ValidateResult<Self> {
        Self::scan(dir, |kind| naming::test_pattern(enqueue, kind))
    }

    /// Digest captured post-execution snapshots under `dir`
    ///
    /// # Errors
    ///
    /// Returns error if a file cannot be read or two files share a position.
    pub fn captured(dir: &Path, enqueue: EnqueueIndex) -> ValidateResult<Self> {
        Self::scan(dir, |kind| naming::post_pattern(enqueue, kind))
    }

    fn scan(dir: &Path, pattern: impl Fn(OutputKind) -> FilePattern) -> ValidateResult<Self> {
        let mut set = Self::default();
        for kind in [OutputKind::Buffer, OutputKind::Image] {
            for (position, path) in reader::scan(dir, &pattern(kind))? {
                let digest = digest_file(&path)?;
                tracing::debug!(position, file = %path.display(), digest = %digest.short(), "Digested output");
                if let Some(first) = set.entries.get(&position) {
                    return Err(CaptureError::DuplicateArtifact {
                        position,
                        first: first.path.clone(),
                        second: path,
                    }
                    .into());
                }
                set.entries
                    .insert(position, DigestEntry { path, kind, digest });
            }
        }
        Ok(set)
    }

    /// Entry at a position
    #[must_use]
    pub fn get(&self, position: Position) -> Option<&DigestEntry> {
        self.entries.get(&position)
    }

    /// Positions present, ascending
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        self.entries.keys().copied()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no outputs were found
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn digest_file(path: &Path) -> ValidateResult<Digest> {
    let file = File::open(path).map_err(|e| ValidateError::Digest {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Digest::compute_reader(BufReader::new(file)).map_err(|e| ValidateError::Digest {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
