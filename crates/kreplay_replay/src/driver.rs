//! Launch and read-back.

use crate::bind::Bindings;
use crate::device::{Device, KernelId, ReadRequest};
use crate::error::{ReplayError, ReplayResult};
use kreplay_capture::{OutputKind, naming};
use kreplay_core::{EnqueueIndex, LaunchGeometry, Position};
use std::path::{Path, PathBuf};

/// Content read back for one output position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputData {
    /// Argument position
    pub position: Position,
    /// Output file kind
    pub kind: OutputKind,
    /// Bytes read from the device
    pub bytes: Vec<u8>,
}

/// Enqueues the kernel and collects its outputs
#[derive(Debug, Clone)]
pub struct ExecutionDriver<'a> {
    geometry: &'a LaunchGeometry,
    repetitions: u32,
}

impl<'a> ExecutionDriver<'a> {
    /// Driver for one geometry, launching once
    #[must_use]
    pub fn new(geometry: &'a LaunchGeometry) -> Self {
        Self {
            geometry,
            repetitions: 1,
        }
    }

    /// Set the number of back-to-back launches
    #[must_use]
    pub fn with_repetitions(mut self, repetitions: u32) -> Self {
        self.repetitions = repetitions;
        self
    }

    /// Enqueue the kernel `repetitions` times with identical geometry.
    ///
    /// # Errors
    ///
    /// Returns error if repetitions is zero or a launch is rejected.
    pub fn execute(&self, device: &mut dyn Device, kernel: KernelId) -> ReplayResult<u32> {
        if self.repetitions == 0 {
            return Err(ReplayError::InvalidConfig {
                reason: "repetitions must be at least 1".to_string(),
            });
        }
        tracing::info!(
            geometry = %self.geometry,
            repetitions = self.repetitions,
            "Enqueueing kernel"
        );
        for _ in 0..self.repetitions {
            device.launch(kernel, self.geometry)?;
        }
        Ok(self.repetitions)
    }

    /// Read every output back in one batch.
    ///
    /// # Errors
    ///
    /// Returns error if the device read-back fails.
    pub fn read_outputs(
        &self,
        device: &mut dyn Device,
        bindings: &Bindings,
    ) -> ReplayResult<Vec<OutputData>> {
        let mut requests: Vec<ReadRequest> = bindings
            .outputs
            .iter()
            .map(|slot| ReadRequest::new(slot.source, slot.len))
            .collect();
        device.read_back(&mut requests)?;

        Ok(bindings
            .outputs
            .iter()
            .zip(requests)
            .map(|(slot, request)| OutputData {
                position: slot.position,
                kind: slot.kind,
                bytes: request.data,
            })
            .collect())
    }
}

/// Write outputs into `dir` under their replayed output names.
///
/// # Errors
///
/// Returns [`ReplayError::Output`] if the directory or a file cannot be
/// written.
pub fn write_outputs(
    dir: &Path,
    enqueue: EnqueueIndex,
    kernel_name: &str,
    outputs: &[OutputData],
) -> ReplayResult<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).map_err(|e| ReplayError::output(dir, &e))?;
    let mut written = Vec::with_capacity(outputs.len());
    for output in outputs {
        let path = dir.join(naming::test_output_name(
            enqueue,
            kernel_name,
            output.position,
            output.kind,
        ));
        std::fs::write(&path, &output.bytes).map_err(|e| ReplayError::output(&path, &e))?;
        tracing::debug!(file = %path.display(), bytes = output.bytes.len(), "Wrote output");
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::OutputSlot;
    use crate::device::{ProgramSource, ReadSource};
    use crate::sim::SimDevice;
    use tempfile::TempDir;

    #[test]
    fn test_repetitions_launch_count() {
        let geometry = LaunchGeometry::parse("256\n0\n0\n").unwrap();
        let mut device = SimDevice::new();
        let program = device
            .build_program(ProgramSource::Source("foo"), "")
            .unwrap();
        let kernel = device.create_kernel(program, "foo").unwrap();

        let issued = ExecutionDriver::new(&geometry)
            .with_repetitions(3)
            .execute(&mut device, kernel)
            .unwrap();
        assert_eq!(issued, 3);
        assert_eq!(device.launches().len(), 3);
        assert!(device.launches().iter().all(|l| l.geometry == geometry));

        let err = ExecutionDriver::new(&geometry)
            .with_repetitions(0)
            .execute(&mut device, kernel)
            .unwrap_err();
        assert!(matches!(err, ReplayError::InvalidConfig { .. }));
    }

    #[test]
    fn test_outputs_written_with_exact_length() {
        let geometry = LaunchGeometry::parse("1\n0\n0\n").unwrap();
        let mut device = SimDevice::new();
        let mem = device.create_buffer(&[5; 10], 10).unwrap();
        let bindings = Bindings {
            bound: 1,
            allocations: 1,
            outputs: vec![OutputSlot {
                position: 2,
                kind: OutputKind::Buffer,
                source: ReadSource::Buffer(mem),
                len: 10,
            }],
        };
        let outputs = ExecutionDriver::new(&geometry)
            .read_outputs(&mut device, &bindings)
            .unwrap();

        let dir = TempDir::new().unwrap();
        let test_dir = dir.path().join("Test");
        let written = write_outputs(&test_dir, EnqueueIndex::new(7), "foo", &outputs).unwrap();
        assert_eq!(
            written,
            vec![test_dir.join("Enqueue_0007_Kernel_foo_Arg_2_Buffer.bin")]
        );
        assert_eq!(std::fs::read(&written[0]).unwrap(), vec![5; 10]);
    }

    proptest::proptest! {
        #[test]
        fn prop_every_repetition_launches(repetitions in 1u32..16) {
            let geometry = LaunchGeometry::parse("4\n0\n0\n").unwrap();
            let mut device = SimDevice::new();
            let program = device
                .build_program(ProgramSource::Source("foo"), "")
                .unwrap();
            let kernel = device.create_kernel(program, "foo").unwrap();
            let issued = ExecutionDriver::new(&geometry)
                .with_repetitions(repetitions)
                .execute(&mut device, kernel)
                .unwrap();
            proptest::prop_assert_eq!(issued, repetitions);
            proptest::prop_assert_eq!(device.launches().len(), repetitions as usize);
        }
    }
}
