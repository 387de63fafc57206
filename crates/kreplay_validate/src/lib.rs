//! kreplay Validator
//!
//! Digests replayed outputs and captured post-execution snapshots and
//! reports, per argument position, whether they are bit-identical.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod report;
pub mod scan;
pub mod types;
pub mod validator;

pub use error::{ValidateError, ValidateResult};
pub use report::{PositionCheck, ValidationReport, Verdict};
pub use scan::{DigestEntry, DigestSet};
pub use types::ArgumentTypes;
pub use validator::{ValidateConfig, Validator};
