//! Typed records decoded from a capture directory.

use kreplay_core::{ArgumentTable, EnqueueIndex, LaunchGeometry, NoticeLog, Position};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identity and launch parameters of the captured enqueue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationDescriptor {
    /// Capture-time enqueue counter
    pub enqueue: EnqueueIndex,
    /// Kernel entry-point name
    pub kernel_name: String,
    /// Build options in file order
    pub build_options: Vec<String>,
    /// Launch geometry
    pub geometry: LaunchGeometry,
}

impl InvocationDescriptor {
    /// Build options joined into one option string
    #[must_use]
    pub fn options_string(&self) -> String {
        self.build_options.join(" ")
    }
}

/// A named byte blob, such as one device binary candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedBlob {
    /// File name the blob was read from
    pub name: String,
    /// Content
    pub bytes: Vec<u8>,
}

/// The form in which the kernel program was preserved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgramCandidate {
    /// Kernel source text
    Source(String),
    /// Portable intermediate representation
    Il(Vec<u8>),
    /// Device binaries in discovery order
    Binaries(Vec<NamedBlob>),
}

impl ProgramCandidate {
    /// Short tier name used in logs
    #[must_use]
    pub const fn tier(&self) -> &'static str {
        match self {
            Self::Source(_) => "source",
            Self::Il(_) => "il",
            Self::Binaries(_) => "binary",
        }
    }
}

/// Everything read from one capture directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    /// Working directory the capture was read from
    pub root: PathBuf,
    /// Enqueue identity and geometry
    pub invocation: InvocationDescriptor,
    /// Argument kinds and payloads
    pub arguments: ArgumentTable,
    /// Program in its preserved form
    pub program: ProgramCandidate,
    /// Whether buffers are bound as SVM regions
    pub svm_active: bool,
    /// Conditions found while reading
    pub notices: NoticeLog,
}

impl Capture {
    /// Positions that produce output files, ascending
    #[must_use]
    pub fn output_positions(&self) -> Vec<Position> {
        self.arguments
            .iter()
            .filter(|(_, kind)| kind.has_output())
            .map(|(pos, _)| pos)
            .collect()
    }
}
