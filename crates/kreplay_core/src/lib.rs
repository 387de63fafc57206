//! kreplay Core Types
//!
//! This crate contains pure types and logic with no I/O.
//! Everything the capture reader, replay driver and validator exchange
//! is defined here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod argument;
pub mod digest;
pub mod enqueue;
pub mod error;
pub mod geometry;
pub mod image;
pub mod notice;
pub mod sampler;

// Re-exports
pub use argument::{ArgumentKind, ArgumentRecord, ArgumentTable, Position};
pub use digest::Digest;
pub use enqueue::EnqueueIndex;
pub use error::{CoreError, CoreResult};
pub use geometry::LaunchGeometry;
pub use image::{ImageDescriptor, ImageFormat, ImageShape, ImageType};
pub use notice::{Notice, NoticeLog};
pub use sampler::{AddressingMode, FilterMode, SamplerDescriptor};
