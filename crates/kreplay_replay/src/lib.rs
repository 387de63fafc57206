//! kreplay Replay Engine
//!
//! Rebuilds the captured kernel invocation on a compute device: acquires
//! the program, binds every argument in its recorded form, enqueues the
//! launch and writes the resulting buffer and image contents to disk.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod acquire;
pub mod bind;
pub mod device;
pub mod driver;
pub mod engine;
pub mod error;
#[cfg(feature = "opencl")]
pub mod opencl;
pub mod sim;

pub use acquire::{AcquiredProgram, BinaryAttempt, BinaryOutcome, ProgramAcquirer};
pub use bind::{ArgumentBinder, Bindings, OutputSlot};
pub use device::{
    Device, DeviceError, DeviceInfo, DeviceResult, KernelArg, KernelId, MemId, ProgramId,
    ProgramSource, ReadRequest, ReadSource, SamplerId, SvmId,
};
pub use driver::{ExecutionDriver, OutputData, write_outputs};
pub use engine::{OutputRecord, ReplayConfig, ReplayEngine, ReplaySummary};
pub use error::{ReplayError, ReplayResult};
#[cfg(feature = "opencl")]
pub use opencl::OpenClDevice;
pub use sim::{SimDevice, SimInvocation};
