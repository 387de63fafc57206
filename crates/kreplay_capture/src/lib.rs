//! kreplay Capture Reader
//!
//! Discovers and decodes the on-disk capture of one kernel invocation
//! into typed records, and reconstructs which buffer arguments shared a
//! device allocation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod alias;
pub mod error;
pub mod naming;
pub mod reader;
pub mod record;

pub use alias::{AliasGroup, AliasPlan, SvmGroup};
pub use error::{CaptureError, CaptureResult};
pub use naming::{OutputKind, argument_position};
pub use reader::{CaptureReader, ReaderOptions};
pub use record::{Capture, InvocationDescriptor, NamedBlob, ProgramCandidate};
