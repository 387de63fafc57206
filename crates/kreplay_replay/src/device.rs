//! Compute device abstraction.
//!
//! The replay pipeline talks to the runtime only through [`Device`]. Every
//! object the device creates is returned as an opaque handle that stays
//! valid until the device is dropped.

use kreplay_core::{ImageDescriptor, LaunchGeometry, Position, SamplerDescriptor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device result type
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Failures reported by a compute device
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// No usable device or context
    #[error("Device unavailable: {reason}")]
    Unavailable {
        /// Runtime message
        reason: String,
    },

    /// Program build failed
    #[error("Program build failed: {log}")]
    BuildFailed {
        /// Build log or runtime message
        log: String,
    },

    /// The program does not expose the requested entry point
    #[error("Entry point not found: {name}")]
    EntryPointMissing {
        /// Requested entry point
        name: String,
    },

    /// Memory object creation failed
    #[error("Allocation failed: {reason}")]
    Allocation {
        /// Runtime message
        reason: String,
    },

    /// A handle does not belong to this device
    #[error("Invalid {kind} handle {id}")]
    InvalidHandle {
        /// Handle kind
        kind: &'static str,
        /// Raw handle value
        id: u32,
    },

    /// Setting a kernel argument failed
    #[error("Cannot bind argument {position}: {reason}")]
    Binding {
        /// Argument position
        position: Position,
        /// Runtime message
        reason: String,
    },

    /// Enqueueing the kernel failed
    #[error("Launch failed: {reason}")]
    Launch {
        /// Runtime message
        reason: String,
    },

    /// Reading device memory back failed
    #[error("Read-back failed: {reason}")]
    Transfer {
        /// Runtime message
        reason: String,
    },

    /// The device lacks a required capability
    #[error("Unsupported: {what}")]
    Unsupported {
        /// Missing capability
        what: String,
    },
}

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u32);

        impl $name {
            /// Handle kind name
            pub const KIND: &'static str = $kind;

            /// Raw handle value
            #[must_use]
            pub const fn raw(&self) -> u32 {
                self.0
            }

            pub(crate) fn index(self) -> usize {
                self.0 as usize
            }

            pub(crate) fn invalid(self) -> DeviceError {
                DeviceError::InvalidHandle {
                    kind: Self::KIND,
                    id: self.0,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $kind, self.0)
            }
        }
    };
}

handle!(
    /// Built program
    ProgramId,
    "program"
);
handle!(
    /// Kernel object for one entry point
    KernelId,
    "kernel"
);
handle!(
    /// Device buffer or image
    MemId,
    "memory"
);
handle!(
    /// Shared virtual memory region
    SvmId,
    "svm"
);
handle!(
    /// Sampler object
    SamplerId,
    "sampler"
);

pub(crate) fn next_handle(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Program input handed to the device compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramSource<'a> {
    /// Kernel source text
    Source(&'a str),
    /// Portable intermediate representation
    Il(&'a [u8]),
    /// Device-specific binary
    Binary(&'a [u8]),
}

impl ProgramSource<'_> {
    /// Short name used in logs
    #[must_use]
    pub const fn tier(&self) -> &'static str {
        match self {
            Self::Source(_) => "source",
            Self::Il(_) => "il",
            Self::Binary(_) => "binary",
        }
    }
}

/// Value bound to one kernel argument position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelArg<'a> {
    /// Raw value bytes
    Scalar(&'a [u8]),
    /// Device buffer
    Buffer(MemId),
    /// Device image
    Image(MemId),
    /// SVM region at a byte offset
    Svm {
        /// Region handle
        region: SvmId,
        /// Byte offset into the region
        offset: u64,
    },
    /// Uninitialized local memory
    Local(u64),
    /// Sampler object
    Sampler(SamplerId),
}

impl KernelArg<'_> {
    /// Short kind name used in logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Buffer(_) => "buffer",
            Self::Image(_) => "image",
            Self::Svm { .. } => "svm",
            Self::Local(_) => "local",
            Self::Sampler(_) => "sampler",
        }
    }
}

/// Memory object to read back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// Buffer content from byte 0
    Buffer(MemId),
    /// Full image extent
    Image(MemId),
    /// SVM region content from byte 0
    Svm(SvmId),
}

/// One read-back destination; `data` is sized by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    /// Memory object to read
    pub source: ReadSource,
    /// Destination, filled in place
    pub data: Vec<u8>,
}

impl ReadRequest {
    /// Request `len` bytes from `source`
    #[must_use]
    pub fn new(source: ReadSource, len: usize) -> Self {
        Self {
            source,
            data: vec![0; len],
        }
    }
}

/// Identification of one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name
    pub name: String,
    /// Vendor string
    pub vendor: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.vendor)
    }
}

/// A compute device with one in-order queue
pub trait Device {
    /// Device identification
    fn info(&self) -> DeviceInfo;

    /// Build a program with the given option string.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::BuildFailed`] with the build log on failure.
    fn build_program(&mut self, source: ProgramSource<'_>, options: &str)
    -> DeviceResult<ProgramId>;

    /// Create the kernel object for an entry point.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::EntryPointMissing`] if the program lacks it.
    fn create_kernel(&mut self, program: ProgramId, name: &str) -> DeviceResult<KernelId>;

    /// Declared argument count, when the runtime reports it
    fn kernel_arity(&self, kernel: KernelId) -> Option<u32>;

    /// Allocate a buffer of `len` bytes seeded with `contents`.
    ///
    /// # Errors
    ///
    /// Returns error if the allocation fails.
    fn create_buffer(&mut self, contents: &[u8], len: usize) -> DeviceResult<MemId>;

    /// Allocate an image seeded with `contents`.
    ///
    /// # Errors
    ///
    /// Returns error if the allocation fails.
    fn create_image(&mut self, descriptor: &ImageDescriptor, contents: &[u8])
    -> DeviceResult<MemId>;

    /// Allocate an SVM region of `len` bytes seeded with `contents`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Unsupported`] on devices without SVM.
    fn create_svm(&mut self, contents: &[u8], len: usize) -> DeviceResult<SvmId>;

    /// Create a sampler object.
    ///
    /// # Errors
    ///
    /// Returns error if the runtime rejects the sampler state.
    fn create_sampler(&mut self, descriptor: &SamplerDescriptor) -> DeviceResult<SamplerId>;

    /// Set one kernel argument.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Binding`] if the runtime rejects the value.
    fn bind(&mut self, kernel: KernelId, position: Position, arg: KernelArg<'_>)
    -> DeviceResult<()>;

    /// Enqueue one launch without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Launch`] if the enqueue is rejected.
    fn launch(&mut self, kernel: KernelId, geometry: &LaunchGeometry) -> DeviceResult<()>;

    /// Read every request back and wait for the queue to drain.
    ///
    /// All reads are enqueued behind previously queued work; the call
    /// returns once every `data` buffer is filled.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Transfer`] if any read fails.
    fn read_back(&mut self, requests: &mut [ReadRequest]) -> DeviceResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_display() {
        assert_eq!(MemId(3).to_string(), "memory#3");
        assert_eq!(SvmId(0).raw(), 0);
        assert_eq!(
            KernelId(7).invalid(),
            DeviceError::InvalidHandle {
                kind: "kernel",
                id: 7
            }
        );
    }

    #[test]
    fn test_read_request_is_sized() {
        let request = ReadRequest::new(ReadSource::Buffer(MemId(0)), 12);
        assert_eq!(request.data.len(), 12);
    }

    #[test]
    fn test_arg_kind_names() {
        assert_eq!(KernelArg::Scalar(&[1]).kind(), "scalar");
        assert_eq!(
            KernelArg::Svm {
                region: SvmId(0),
                offset: 8
            }
            .kind(),
            "svm"
        );
    }
}
