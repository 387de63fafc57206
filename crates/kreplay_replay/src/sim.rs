//! Host-memory device.
//!
//! `SimDevice` keeps every memory object as a byte vector and runs kernels
//! as host closures registered by entry-point name. Unregistered kernels
//! launch as no-ops, so outputs equal their pre-state. Every build attempt
//! and launch is recorded for inspection.
//!
//! Build rules: a binary or IL blob that is empty fails to build, source
//! text containing `#error` fails to build, and an entry point exists when
//! its name occurs in the program bytes.

use crate::device::{
    Device, DeviceError, DeviceInfo, DeviceResult, KernelArg, KernelId, MemId, ProgramId,
    ProgramSource, ReadRequest, ReadSource, SamplerId, SvmId, next_handle,
};
use kreplay_core::{ImageDescriptor, LaunchGeometry, Position, SamplerDescriptor};
use std::collections::{BTreeMap, HashMap};

/// Host implementation of one kernel
pub type HostKernel = Box<dyn FnMut(&mut SimInvocation<'_>)>;

/// Owned form of a bound argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimArg {
    /// Raw value bytes
    Scalar(Vec<u8>),
    /// Buffer handle
    Buffer(MemId),
    /// Image handle
    Image(MemId),
    /// SVM region at an offset
    Svm {
        /// Region handle
        region: SvmId,
        /// Byte offset
        offset: u64,
    },
    /// Local memory size
    Local(u64),
    /// Sampler handle
    Sampler(SamplerId),
}

impl From<KernelArg<'_>> for SimArg {
    fn from(arg: KernelArg<'_>) -> Self {
        match arg {
            KernelArg::Scalar(bytes) => Self::Scalar(bytes.to_vec()),
            KernelArg::Buffer(id) => Self::Buffer(id),
            KernelArg::Image(id) => Self::Image(id),
            KernelArg::Svm { region, offset } => Self::Svm { region, offset },
            KernelArg::Local(size) => Self::Local(size),
            KernelArg::Sampler(id) => Self::Sampler(id),
        }
    }
}

/// One recorded build attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecord {
    /// Program tier
    pub tier: &'static str,
    /// Option string
    pub options: String,
    /// Whether the build succeeded
    pub succeeded: bool,
}

/// One recorded launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRecord {
    /// Entry point
    pub kernel: String,
    /// Geometry used
    pub geometry: LaunchGeometry,
    /// Arguments bound at launch time
    pub args: BTreeMap<Position, SimArg>,
}

#[derive(Debug)]
struct SimProgram {
    bytes: Vec<u8>,
}

#[derive(Debug)]
struct SimKernel {
    name: String,
    args: BTreeMap<Position, SimArg>,
}

#[derive(Debug)]
struct SimMemory {
    bytes: Vec<u8>,
    image: Option<ImageDescriptor>,
}

/// View of device state handed to a host kernel
pub struct SimInvocation<'a> {
    geometry: &'a LaunchGeometry,
    args: &'a BTreeMap<Position, SimArg>,
    memories: &'a mut [SimMemory],
    regions: &'a mut [Vec<u8>],
}

impl SimInvocation<'_> {
    /// Launch geometry
    #[must_use]
    pub fn geometry(&self) -> &LaunchGeometry {
        self.geometry
    }

    /// Bound argument at a position
    #[must_use]
    pub fn arg(&self, position: Position) -> Option<&SimArg> {
        self.args.get(&position)
    }

    /// Scalar bytes at a position
    #[must_use]
    pub fn scalar(&self, position: Position) -> Option<&[u8]> {
        match self.args.get(&position)? {
            SimArg::Scalar(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Mutable memory behind a buffer, image or SVM argument.
    ///
    /// SVM arguments start at their bound offset.
    pub fn memory(&mut self, position: Position) -> Option<&mut [u8]> {
        match self.args.get(&position)? {
            SimArg::Buffer(id) | SimArg::Image(id) => self
                .memories
                .get_mut(id.index())
                .map(|m| m.bytes.as_mut_slice()),
            SimArg::Svm { region, offset } => {
                let region = self.regions.get_mut(region.index())?;
                let start = usize::try_from(*offset).ok()?;
                region.get_mut(start..)
            }
            _ => None,
        }
    }
}

/// Host-memory [`Device`]
pub struct SimDevice {
    info: DeviceInfo,
    programs: Vec<SimProgram>,
    kernels: Vec<SimKernel>,
    memories: Vec<SimMemory>,
    regions: Vec<Vec<u8>>,
    samplers: Vec<SamplerDescriptor>,
    host_kernels: HashMap<String, HostKernel>,
    arities: HashMap<String, u32>,
    svm_supported: bool,
    builds: Vec<BuildRecord>,
    launches: Vec<LaunchRecord>,
}

impl std::fmt::Debug for SimDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimDevice")
            .field("info", &self.info)
            .field("programs", &self.programs.len())
            .field("kernels", &self.kernels.len())
            .field("memories", &self.memories.len())
            .field("regions", &self.regions.len())
            .field("launches", &self.launches.len())
            .finish_non_exhaustive()
    }
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDevice {
    /// Create an empty host device
    #[must_use]
    pub fn new() -> Self {
        Self {
            info: DeviceInfo {
                name: "kreplay host simulator".to_string(),
                vendor: "kreplay".to_string(),
            },
            programs: Vec::new(),
            kernels: Vec::new(),
            memories: Vec::new(),
            regions: Vec::new(),
            samplers: Vec::new(),
            host_kernels: HashMap::new(),
            arities: HashMap::new(),
            svm_supported: true,
            builds: Vec::new(),
            launches: Vec::new(),
        }
    }

    /// Register a host implementation for an entry point
    #[must_use]
    pub fn with_kernel(
        mut self,
        name: impl Into<String>,
        kernel: impl FnMut(&mut SimInvocation<'_>) + 'static,
    ) -> Self {
        self.host_kernels.insert(name.into(), Box::new(kernel));
        self
    }

    /// Report a declared argument count for an entry point
    #[must_use]
    pub fn with_arity(mut self, name: impl Into<String>, arity: u32) -> Self {
        self.arities.insert(name.into(), arity);
        self
    }

    /// Enable or disable SVM support
    #[must_use]
    pub fn with_svm(mut self, supported: bool) -> Self {
        self.svm_supported = supported;
        self
    }

    /// Build attempts in call order
    #[must_use]
    pub fn builds(&self) -> &[BuildRecord] {
        &self.builds
    }

    /// Launches in call order
    #[must_use]
    pub fn launches(&self) -> &[LaunchRecord] {
        &self.launches
    }

    /// Number of buffer and image allocations
    #[must_use]
    pub fn memory_count(&self) -> usize {
        self.memories.len()
    }

    /// Number of SVM allocations
    #[must_use]
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    fn kernel(&self, kernel: KernelId) -> DeviceResult<&SimKernel> {
        self.kernels.get(kernel.index()).ok_or_else(|| kernel.invalid())
    }

    fn check_mem(&self, id: MemId) -> DeviceResult<&SimMemory> {
        self.memories.get(id.index()).ok_or_else(|| id.invalid())
    }
}

fn seeded(contents: &[u8], len: usize) -> Vec<u8> {
    let mut bytes = vec![0; len.max(contents.len())];
    bytes[..contents.len()].copy_from_slice(contents);
    bytes
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

impl Device for SimDevice {
    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn build_program(
        &mut self,
        source: ProgramSource<'_>,
        options: &str,
    ) -> DeviceResult<ProgramId> {
        let result = match source {
            ProgramSource::Source(text) if text.contains("#error") => Err("#error directive"),
            ProgramSource::Source(text) => Ok(text.as_bytes().to_vec()),
            ProgramSource::Il(bytes) | ProgramSource::Binary(bytes) if bytes.is_empty() => {
                Err("empty program image")
            }
            ProgramSource::Il(bytes) | ProgramSource::Binary(bytes) => Ok(bytes.to_vec()),
        };
        self.builds.push(BuildRecord {
            tier: source.tier(),
            options: options.to_string(),
            succeeded: result.is_ok(),
        });
        let bytes = result.map_err(|log| DeviceError::BuildFailed {
            log: log.to_string(),
        })?;
        let id = ProgramId(next_handle(self.programs.len()));
        self.programs.push(SimProgram { bytes });
        Ok(id)
    }

    fn create_kernel(&mut self, program: ProgramId, name: &str) -> DeviceResult<KernelId> {
        let built = self
            .programs
            .get(program.index())
            .ok_or_else(|| program.invalid())?;
        if !contains(&built.bytes, name.as_bytes()) {
            return Err(DeviceError::EntryPointMissing {
                name: name.to_string(),
            });
        }
        let id = KernelId(next_handle(self.kernels.len()));
        self.kernels.push(SimKernel {
            name: name.to_string(),
            args: BTreeMap::new(),
        });
        Ok(id)
    }

    fn kernel_arity(&self, kernel: KernelId) -> Option<u32> {
        let kernel = self.kernels.get(kernel.index())?;
        self.arities.get(&kernel.name).copied()
    }

    fn create_buffer(&mut self, contents: &[u8], len: usize) -> DeviceResult<MemId> {
        let id = MemId(next_handle(self.memories.len()));
        self.memories.push(SimMemory {
            bytes: seeded(contents, len),
            image: None,
        });
        Ok(id)
    }

    fn create_image(
        &mut self,
        descriptor: &ImageDescriptor,
        contents: &[u8],
    ) -> DeviceResult<MemId> {
        let id = MemId(next_handle(self.memories.len()));
        self.memories.push(SimMemory {
            bytes: contents.to_vec(),
            image: Some(*descriptor),
        });
        Ok(id)
    }

    fn create_svm(&mut self, contents: &[u8], len: usize) -> DeviceResult<SvmId> {
        if !self.svm_supported {
            return Err(DeviceError::Unsupported {
                what: "shared virtual memory".to_string(),
            });
        }
        let id = SvmId(next_handle(self.regions.len()));
        self.regions.push(seeded(contents, len));
        Ok(id)
    }

    fn create_sampler(&mut self, descriptor: &SamplerDescriptor) -> DeviceResult<SamplerId> {
        let id = SamplerId(next_handle(self.samplers.len()));
        self.samplers.push(*descriptor);
        Ok(id)
    }

    fn bind(
        &mut self,
        kernel: KernelId,
        position: Position,
        arg: KernelArg<'_>,
    ) -> DeviceResult<()> {
        let binding_error = |reason: String| DeviceError::Binding { position, reason };
        match arg {
            KernelArg::Buffer(id) => {
                if self.check_mem(id)?.image.is_some() {
                    return Err(binding_error(format!("{id} is an image")));
                }
            }
            KernelArg::Image(id) => {
                if self.check_mem(id)?.image.is_none() {
                    return Err(binding_error(format!("{id} is not an image")));
                }
            }
            KernelArg::Svm { region, offset } => {
                let bytes = self.regions.get(region.index()).ok_or_else(|| region.invalid())?;
                if offset > bytes.len() as u64 {
                    return Err(binding_error(format!(
                        "offset {offset} past end of {}-byte region",
                        bytes.len()
                    )));
                }
            }
            KernelArg::Sampler(id) => {
                if id.index() >= self.samplers.len() {
                    return Err(id.invalid());
                }
            }
            KernelArg::Scalar(_) | KernelArg::Local(_) => {}
        }
        if let Some(arity) = self.kernel_arity(kernel) {
            if position >= arity {
                return Err(binding_error(format!("kernel declares {arity} arguments")));
            }
        }
        let target = self
            .kernels
            .get_mut(kernel.index())
            .ok_or_else(|| kernel.invalid())?;
        target.args.insert(position, arg.into());
        Ok(())
    }

    fn launch(&mut self, kernel: KernelId, geometry: &LaunchGeometry) -> DeviceResult<()> {
        let target = self.kernel(kernel)?;
        if let Some(arity) = self.arities.get(&target.name) {
            if let Some(unset) = (0..*arity).find(|pos| !target.args.contains_key(pos)) {
                return Err(DeviceError::Launch {
                    reason: format!("argument {unset} is not set"),
                });
            }
        }
        let target = &self.kernels[kernel.index()];
        if let Some(host) = self.host_kernels.get_mut(&target.name) {
            let mut invocation = SimInvocation {
                geometry,
                args: &target.args,
                memories: &mut self.memories,
                regions: &mut self.regions,
            };
            host(&mut invocation);
        }
        self.launches.push(LaunchRecord {
            kernel: target.name.clone(),
            geometry: geometry.clone(),
            args: target.args.clone(),
        });
        Ok(())
    }

    fn read_back(&mut self, requests: &mut [ReadRequest]) -> DeviceResult<()> {
        for request in requests {
            let source: &[u8] = match request.source {
                ReadSource::Buffer(id) | ReadSource::Image(id) => {
                    self.check_mem(id)?.bytes.as_slice()
                }
                ReadSource::Svm(id) => self
                    .regions
                    .get(id.index())
                    .ok_or_else(|| id.invalid())?
                    .as_slice(),
            };
            let len = request.data.len();
            let bytes = source.get(..len).ok_or_else(|| DeviceError::Transfer {
                reason: format!("requested {len} bytes from a {}-byte object", source.len()),
            })?;
            request.data.copy_from_slice(bytes);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> LaunchGeometry {
        LaunchGeometry::parse("4\n0\n0\n").unwrap()
    }

    #[test]
    fn test_build_rules() {
        let mut device = SimDevice::new();
        assert!(device.build_program(ProgramSource::Binary(&[]), "").is_err());
        assert!(matches!(
            device.build_program(ProgramSource::Source("#error nope"), "-DX"),
            Err(DeviceError::BuildFailed { .. })
        ));
        let program = device
            .build_program(ProgramSource::Source("__kernel void foo() {}"), "")
            .unwrap();
        assert!(device.create_kernel(program, "foo").is_ok());
        assert_eq!(
            device.create_kernel(program, "bar"),
            Err(DeviceError::EntryPointMissing {
                name: "bar".to_string()
            })
        );
        let succeeded: Vec<bool> = device.builds().iter().map(|b| b.succeeded).collect();
        assert_eq!(succeeded, vec![false, false, true]);
        assert_eq!(device.builds()[1].options, "-DX");
    }

    #[test]
    fn test_host_kernel_writes_through_aliases() {
        let mut device = SimDevice::new().with_kernel("inc", |inv: &mut SimInvocation<'_>| {
            if let Some(bytes) = inv.memory(0) {
                for b in bytes.iter_mut() {
                    *b += 1;
                }
            }
        });
        let program = device
            .build_program(ProgramSource::Source("kernel void inc"), "")
            .unwrap();
        let kernel = device.create_kernel(program, "inc").unwrap();
        let mem = device.create_buffer(&[1, 2, 3], 3).unwrap();
        device.bind(kernel, 0, KernelArg::Buffer(mem)).unwrap();
        device.bind(kernel, 1, KernelArg::Buffer(mem)).unwrap();
        device.launch(kernel, &geometry()).unwrap();
        device.launch(kernel, &geometry()).unwrap();

        let mut requests = vec![
            ReadRequest::new(ReadSource::Buffer(mem), 3),
            ReadRequest::new(ReadSource::Buffer(mem), 3),
        ];
        device.read_back(&mut requests).unwrap();
        assert_eq!(requests[0].data, vec![3, 4, 5]);
        assert_eq!(requests[0].data, requests[1].data);
        assert_eq!(device.launches().len(), 2);
    }

    #[test]
    fn test_svm_offset_view() {
        let mut device = SimDevice::new().with_kernel("mark", |inv: &mut SimInvocation<'_>| {
            if let Some(bytes) = inv.memory(1) {
                bytes[0] = 0xFF;
            }
        });
        let program = device.build_program(ProgramSource::Il(b"mark"), "").unwrap();
        let kernel = device.create_kernel(program, "mark").unwrap();
        let region = device.create_svm(&[0; 8], 8).unwrap();
        device
            .bind(kernel, 0, KernelArg::Svm { region, offset: 0 })
            .unwrap();
        device
            .bind(kernel, 1, KernelArg::Svm { region, offset: 4 })
            .unwrap();
        device.launch(kernel, &geometry()).unwrap();

        let mut requests = vec![ReadRequest::new(ReadSource::Svm(region), 8)];
        device.read_back(&mut requests).unwrap();
        assert_eq!(requests[0].data, vec![0, 0, 0, 0, 0xFF, 0, 0, 0]);
    }

    #[test]
    fn test_arity_enforced_at_launch() {
        let mut device = SimDevice::new().with_arity("foo", 2);
        let program = device
            .build_program(ProgramSource::Source("foo"), "")
            .unwrap();
        let kernel = device.create_kernel(program, "foo").unwrap();
        assert_eq!(device.kernel_arity(kernel), Some(2));
        device.bind(kernel, 0, KernelArg::Local(64)).unwrap();
        assert!(matches!(
            device.launch(kernel, &geometry()),
            Err(DeviceError::Launch { .. })
        ));
        assert!(matches!(
            device.bind(kernel, 2, KernelArg::Local(64)),
            Err(DeviceError::Binding { position: 2, .. })
        ));
    }

    #[test]
    fn test_svm_unsupported() {
        let mut device = SimDevice::new().with_svm(false);
        assert!(matches!(
            device.create_svm(&[1], 1),
            Err(DeviceError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_short_object_read_fails() {
        let mut device = SimDevice::new();
        let mem = device.create_buffer(&[1, 2], 2).unwrap();
        let mut requests = vec![ReadRequest::new(ReadSource::Buffer(mem), 4)];
        assert!(matches!(
            device.read_back(&mut requests),
            Err(DeviceError::Transfer { .. })
        ));
    }
}
