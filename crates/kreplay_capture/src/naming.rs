//! File naming conventions of a capture directory.
//!
//! Argument positions are embedded in file names. The first integer token
//! is the position unless an `_Arg_<n>` marker is present, because names
//! such as `Enqueue_0012_Kernel_scale_Arg_3.bin` carry the enqueue index
//! before the position.

use kreplay_core::{EnqueueIndex, Position};
use once_cell::sync::Lazy;
use regex::Regex;

/// Entry-point name
pub const KERNEL_NAME_FILE: &str = "knlName.txt";
/// Build options, one per line
pub const BUILD_OPTIONS_FILE: &str = "buildOptions.txt";
/// Launch geometry
pub const WORK_SIZES_FILE: &str = "worksizes.txt";
/// Enqueue index
pub const ENQUEUE_NUMBER_FILE: &str = "enqueueNumber.txt";
/// Kernel source text
pub const SOURCE_FILE: &str = "kernel.cl";
/// Portable intermediate representation
pub const IL_FILE: &str = "kernel.spv";
/// Optional per-position data type annotations
pub const ARGUMENT_TYPES_FILE: &str = "ArgumentDataTypes.txt";

/// Buffer and image content before the enqueue
pub const PRE_DIR: &str = "Pre";
/// Buffer and image content after the original enqueue
pub const POST_DIR: &str = "Post";
/// Replayed outputs
pub const TEST_DIR: &str = "Test";

static ARG_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_Arg_(\d+)").expect("static regex is valid"));
static FIRST_INTEGER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+").expect("static regex is valid"));

/// Extract the argument position embedded in a file name
#[must_use]
pub fn argument_position(file_name: &str) -> Option<Position> {
    if let Some(caps) = ARG_MARKER.captures(file_name) {
        return caps[1].parse().ok();
    }
    FIRST_INTEGER
        .find(file_name)
        .and_then(|m| m.as_str().parse().ok())
}

/// A `<prefix>*<suffix>` file name pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePattern {
    prefix: String,
    suffix: String,
    marker: Option<&'static str>,
}

impl FilePattern {
    /// Pattern matching names that start with `prefix` and end with `suffix`
    #[must_use]
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
            marker: None,
        }
    }

    /// Additionally require `marker` somewhere between prefix and suffix
    #[must_use]
    pub fn containing(mut self, marker: &'static str) -> Self {
        self.marker = Some(marker);
        self
    }

    /// Whether a file name matches
    #[must_use]
    pub fn matches(&self, file_name: &str) -> bool {
        if file_name.len() < self.prefix.len() + self.suffix.len() {
            return false;
        }
        if !file_name.starts_with(&self.prefix) || !file_name.ends_with(&self.suffix) {
            return false;
        }
        match self.marker {
            Some(marker) => {
                file_name[self.prefix.len()..file_name.len() - self.suffix.len()].contains(marker)
            }
            None => true,
        }
    }

    /// Human-readable glob form for diagnostics
    #[must_use]
    pub fn glob(&self) -> String {
        match self.marker {
            Some(marker) => format!("{}*{}*{}", self.prefix, marker, self.suffix),
            None => format!("{}*{}", self.prefix, self.suffix),
        }
    }
}

/// `Argument<N>.bin`
#[must_use]
pub fn argument_pattern() -> FilePattern {
    FilePattern::new("Argument", ".bin")
}

/// `Local<N>.txt`
#[must_use]
pub fn local_pattern() -> FilePattern {
    FilePattern::new("Local", ".txt")
}

/// `Sampler<N>.txt`
#[must_use]
pub fn sampler_pattern() -> FilePattern {
    FilePattern::new("Sampler", ".txt")
}

/// `SVM_Arg_Offset<N>.txt`
#[must_use]
pub fn svm_offset_pattern() -> FilePattern {
    FilePattern::new("SVM_Arg_Offset", ".txt")
}

/// `DeviceBinary*.bin`
#[must_use]
pub fn device_binary_pattern() -> FilePattern {
    FilePattern::new("DeviceBinary", ".bin")
}

/// `Pre/Enqueue_<padded>_*_Arg_<N>*.bin`
#[must_use]
pub fn pre_buffer_pattern(enqueue: EnqueueIndex) -> FilePattern {
    FilePattern::new(enqueue.file_prefix(), ".bin").containing("_Arg_")
}

/// `Pre/Enqueue_<padded>_*_Arg_<N>*.raw`
#[must_use]
pub fn pre_image_pattern(enqueue: EnqueueIndex) -> FilePattern {
    FilePattern::new(enqueue.file_prefix(), ".raw").containing("_Arg_")
}

/// `Post/Enqueue_<padded>_Kernel_*_Arg_<N>.<ext>`
#[must_use]
pub fn post_pattern(enqueue: EnqueueIndex, kind: OutputKind) -> FilePattern {
    FilePattern::new(format!("{}Kernel_", enqueue.file_prefix()), kind.extension())
        .containing("_Arg_")
}

/// `Test/Enqueue_<padded>_Kernel_*_Arg_<N>_<Kind>.<ext>`
#[must_use]
pub fn test_pattern(enqueue: EnqueueIndex, kind: OutputKind) -> FilePattern {
    FilePattern::new(
        format!("{}Kernel_", enqueue.file_prefix()),
        format!("_{}{}", kind.label(), kind.extension()),
    )
    .containing("_Arg_")
}

/// `Image_MetaData_<N>.txt` for one position
#[must_use]
pub fn image_metadata_name(position: Position) -> String {
    format!("Image_MetaData_{}.txt", position)
}

/// Output artifact kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum OutputKind {
    /// Buffer or SVM content, `.bin`
    Buffer,
    /// Image content, `.raw`
    Image,
}

impl OutputKind {
    /// File extension including the dot
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Buffer => ".bin",
            Self::Image => ".raw",
        }
    }

    /// Label used in replayed output names
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Buffer => "Buffer",
            Self::Image => "Image",
        }
    }
}

/// Name of a replayed output file
#[must_use]
pub fn test_output_name(
    enqueue: EnqueueIndex,
    kernel_name: &str,
    position: Position,
    kind: OutputKind,
) -> String {
    format!(
        "{}Kernel_{}_Arg_{}_{}{}",
        enqueue.file_prefix(),
        kernel_name,
        position,
        kind.label(),
        kind.extension()
    )
}

/// Sort key for candidate files: embedded integer first, then name
#[must_use]
pub fn discovery_key(file_name: &str) -> (Option<Position>, String) {
    (
        FIRST_INTEGER
            .find(file_name)
            .and_then(|m| m.as_str().parse().ok()),
        file_name.to_string(),
    )
}
