//! Replay orchestration.

use crate::acquire::ProgramAcquirer;
use crate::bind::ArgumentBinder;
use crate::device::Device;
use crate::driver::{ExecutionDriver, write_outputs};
use crate::error::ReplayResult;
use kreplay_capture::{AliasPlan, Capture, CaptureReader, OutputKind, ReaderOptions};
use kreplay_capture::naming;
use kreplay_core::{Digest, EnqueueIndex, NoticeLog, Position};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Replay engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Back-to-back launches, at least 1
    pub repetitions: u32,
    /// Bind buffers as SVM even without non-zero offsets
    pub force_svm: bool,
    /// Write outputs to the test directory
    pub write_outputs: bool,
    /// Output directory, relative to the capture directory
    pub test_dir: PathBuf,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            repetitions: 1,
            force_svm: false,
            write_outputs: true,
            test_dir: PathBuf::from(naming::TEST_DIR),
        }
    }
}

/// One replayed output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// Argument position
    pub position: Position,
    /// Output kind
    pub kind: OutputKind,
    /// Byte length
    pub len: usize,
    /// Content digest
    pub digest: Digest,
    /// File written, if outputs were written
    pub path: Option<PathBuf>,
}

/// What one replay did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySummary {
    /// Enqueue index replayed
    pub enqueue: EnqueueIndex,
    /// Entry point
    pub kernel_name: String,
    /// Device used
    pub device: String,
    /// Program tier
    pub tier: String,
    /// Accepted device binary, for the binary tier
    pub selected_binary: Option<String>,
    /// Launch geometry as displayed
    pub geometry: String,
    /// Launches issued
    pub enqueues: u32,
    /// Outputs in position order
    pub outputs: Vec<OutputRecord>,
    /// Non-fatal conditions in the order they arose
    pub notices: NoticeLog,
}

impl ReplaySummary {
    /// Human-readable report, one line per item
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "Replayed enqueue {} kernel {} on {} from {}{}",
            self.enqueue,
            self.kernel_name,
            self.device,
            self.tier,
            self.selected_binary
                .as_deref()
                .map(|b| format!(" ({b})"))
                .unwrap_or_default()
        )];
        lines.push(format!("{} x {}", self.enqueues, self.geometry));
        for output in &self.outputs {
            lines.push(format!(
                "Argument {} {} {} bytes {}",
                output.position,
                output.kind.label(),
                output.len,
                output.digest.short()
            ));
        }
        lines.extend(self.notices.lines());
        lines
    }
}

/// Replays one captured kernel invocation
#[derive(Debug, Clone, Default)]
pub struct ReplayEngine {
    config: ReplayConfig,
}

impl ReplayEngine {
    /// Create an engine with the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom config
    #[must_use]
    pub fn with_config(mut self, config: ReplayConfig) -> Self {
        self.config = config;
        self
    }

    /// Read the capture under `root` and replay it.
    ///
    /// # Errors
    ///
    /// Returns error if reading the capture or any replay stage fails.
    pub fn run(&self, device: &mut dyn Device, root: &Path) -> ReplayResult<ReplaySummary> {
        let capture = CaptureReader::new(root)
            .with_options(ReaderOptions {
                force_svm: self.config.force_svm,
            })
            .read()?;
        self.replay(device, &capture)
    }

    /// Replay an already-read capture.
    ///
    /// # Errors
    ///
    /// Returns error if program acquisition, binding, launch, read-back or
    /// writing fails.
    pub fn replay(&self, device: &mut dyn Device, capture: &Capture) -> ReplayResult<ReplaySummary> {
        let invocation = &capture.invocation;
        let mut notices = capture.notices.clone();

        let plan = AliasPlan::resolve(&capture.arguments);
        notices.extend(plan.notices.clone());

        let acquired = ProgramAcquirer::new(invocation).acquire(device, &capture.program)?;
        notices.extend(acquired.notices());

        let bindings = ArgumentBinder::new(&capture.arguments, &plan).bind(device, acquired.kernel)?;
        tracing::debug!(
            bound = bindings.bound,
            allocations = bindings.allocations,
            "Arguments bound"
        );

        let driver =
            ExecutionDriver::new(&invocation.geometry).with_repetitions(self.config.repetitions);
        let enqueues = driver.execute(device, acquired.kernel)?;
        let outputs = driver.read_outputs(device, &bindings)?;

        let paths: Vec<Option<PathBuf>> = if self.config.write_outputs && !outputs.is_empty() {
            let dir = capture.root.join(&self.config.test_dir);
            write_outputs(&dir, invocation.enqueue, &invocation.kernel_name, &outputs)?
                .into_iter()
                .map(Some)
                .collect()
        } else {
            vec![None; outputs.len()]
        };

        let outputs = outputs
            .iter()
            .zip(paths)
            .map(|(output, path)| OutputRecord {
                position: output.position,
                kind: output.kind,
                len: output.bytes.len(),
                digest: Digest::compute(&output.bytes),
                path,
            })
            .collect();

        tracing::info!(
            enqueue = %invocation.enqueue,
            enqueues,
            notices = notices.len(),
            "Replay complete"
        );

        Ok(ReplaySummary {
            enqueue: invocation.enqueue,
            kernel_name: invocation.kernel_name.clone(),
            device: device.info().to_string(),
            tier: acquired.tier.to_string(),
            selected_binary: acquired.selected,
            geometry: invocation.geometry.to_string(),
            enqueues,
            outputs,
            notices,
        })
    }
}
