//! Program acquisition.
//!
//! Source text wins over IL, IL wins over device binaries. Source and IL
//! builds are single attempts whose failure is fatal. Device binaries are
//! tried one after another until one builds and exposes the entry point.

use crate::device::{Device, DeviceError, KernelId, ProgramId, ProgramSource};
use crate::error::{ReplayError, ReplayResult};
use kreplay_capture::naming;
use kreplay_capture::{CaptureError, InvocationDescriptor, NamedBlob, ProgramCandidate};
use kreplay_core::{Notice, NoticeLog};
use serde::{Deserialize, Serialize};

/// Outcome of trying one device binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOutcome {
    /// Built and the entry point resolved
    Built,
    /// The build was rejected
    BuildFailed {
        /// Build log
        log: String,
    },
    /// Built, but the entry point is absent
    EntryPointMissing,
}

/// One device binary attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryAttempt {
    /// Candidate file name
    pub candidate: String,
    /// What happened
    pub outcome: BinaryOutcome,
}

impl BinaryAttempt {
    /// Notice for a rejected attempt, `None` if it was accepted
    #[must_use]
    pub fn notice(&self) -> Option<Notice> {
        let reason = match &self.outcome {
            BinaryOutcome::Built => return None,
            BinaryOutcome::BuildFailed { log } => format!("build failed: {}", log.trim()),
            BinaryOutcome::EntryPointMissing => "entry point not found".to_string(),
        };
        Some(Notice::BinaryRejected {
            candidate: self.candidate.clone(),
            reason,
        })
    }
}

/// A built program with its kernel object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredProgram {
    /// Tier the program came from
    pub tier: &'static str,
    /// Program handle
    pub program: ProgramId,
    /// Kernel handle for the entry point
    pub kernel: KernelId,
    /// Selected device binary, for the binary tier
    pub selected: Option<String>,
    /// Every binary attempt in order, accepted one last
    pub attempts: Vec<BinaryAttempt>,
}

impl AcquiredProgram {
    /// Rejected-binary notices in attempt order
    #[must_use]
    pub fn notices(&self) -> NoticeLog {
        let mut log = NoticeLog::new();
        for notice in self.attempts.iter().filter_map(BinaryAttempt::notice) {
            log.push(notice);
        }
        log
    }
}

/// Builds the captured program on a device
pub struct ProgramAcquirer<'a> {
    invocation: &'a InvocationDescriptor,
}

impl<'a> ProgramAcquirer<'a> {
    /// Acquirer for one invocation
    #[must_use]
    pub fn new(invocation: &'a InvocationDescriptor) -> Self {
        Self { invocation }
    }

    /// Build `candidate` and create the entry-point kernel.
    ///
    /// # Errors
    ///
    /// Source and IL failures are returned as is. For binaries, returns
    /// [`ReplayError::NoUsableBinary`] once every candidate is rejected.
    pub fn acquire(
        &self,
        device: &mut dyn Device,
        candidate: &ProgramCandidate,
    ) -> ReplayResult<AcquiredProgram> {
        let options = self.invocation.options_string();
        let name = self.invocation.kernel_name.as_str();

        let source = match candidate {
            ProgramCandidate::Source(text) => ProgramSource::Source(text),
            ProgramCandidate::Il(bytes) => ProgramSource::Il(bytes),
            ProgramCandidate::Binaries(blobs) => return self.acquire_binary(device, blobs),
        };

        tracing::info!(tier = source.tier(), options = %options, "Building program");
        let program = device
            .build_program(source, &options)
            .map_err(|e| ReplayError::build(source.tier(), e))?;
        let kernel = device.create_kernel(program, name)?;
        Ok(AcquiredProgram {
            tier: source.tier(),
            program,
            kernel,
            selected: None,
            attempts: Vec::new(),
        })
    }

    fn acquire_binary(
        &self,
        device: &mut dyn Device,
        blobs: &[NamedBlob],
    ) -> ReplayResult<AcquiredProgram> {
        if blobs.is_empty() {
            return Err(CaptureError::missing(naming::device_binary_pattern().glob()).into());
        }

        let options = self.invocation.options_string();
        let name = self.invocation.kernel_name.as_str();
        let mut attempts = Vec::with_capacity(blobs.len());

        for blob in blobs {
            tracing::debug!(candidate = %blob.name, "Trying device binary");
            let built = device
                .build_program(ProgramSource::Binary(&blob.bytes), &options)
                .and_then(|program| Ok((program, device.create_kernel(program, name)?)));

            let outcome = match built {
                Ok((program, kernel)) => {
                    attempts.push(BinaryAttempt {
                        candidate: blob.name.clone(),
                        outcome: BinaryOutcome::Built,
                    });
                    tracing::info!(candidate = %blob.name, "Device binary accepted");
                    return Ok(AcquiredProgram {
                        tier: "binary",
                        program,
                        kernel,
                        selected: Some(blob.name.clone()),
                        attempts,
                    });
                }
                Err(DeviceError::EntryPointMissing { .. }) => BinaryOutcome::EntryPointMissing,
                Err(DeviceError::BuildFailed { log }) => BinaryOutcome::BuildFailed { log },
                Err(other) => BinaryOutcome::BuildFailed {
                    log: other.to_string(),
                },
            };
            tracing::warn!(candidate = %blob.name, ?outcome, "Device binary rejected");
            attempts.push(BinaryAttempt {
                candidate: blob.name.clone(),
                outcome,
            });
        }

        Err(ReplayError::NoUsableBinary { attempts })
    }
}
