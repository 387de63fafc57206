//! OpenCL device backend.
//!
//! Uses the first device of the first platform with one context and one
//! in-order command queue. Buffers are created with `CL_MEM_COPY_HOST_PTR`.
//! Images are sized by the runtime's element size and seeded with one
//! blocking write, so host copies never run past a short pre-state.

use crate::device::{
    Device, DeviceError, DeviceInfo, DeviceResult, KernelArg, KernelId, MemId, ProgramId,
    ProgramSource, ReadRequest, ReadSource, SamplerId, SvmId, next_handle,
};
use kreplay_core::{
    ImageDescriptor, ImageShape, ImageType, LaunchGeometry, Position, SamplerDescriptor,
};
use opencl3::command_queue::CommandQueue;
use opencl3::context::Context;
use opencl3::device::{CL_DEVICE_TYPE_ALL, Device as ClDevice, get_all_devices};
use opencl3::kernel::Kernel;
use opencl3::memory::{Buffer, CL_MEM_COPY_HOST_PTR, CL_MEM_READ_WRITE, ClMem, Image, Sampler};
use opencl3::program::Program;
use opencl3::types::{
    CL_BLOCKING, CL_NON_BLOCKING, cl_bool, cl_device_id, cl_image_desc, cl_image_format,
};
use std::ffi::c_void;
use std::ptr;

/// Enumerate every OpenCL device.
///
/// # Errors
///
/// Returns [`DeviceError::Unavailable`] if no platform can be queried.
pub fn list_devices() -> DeviceResult<Vec<DeviceInfo>> {
    let ids = get_all_devices(CL_DEVICE_TYPE_ALL).map_err(unavailable)?;
    Ok(ids
        .into_iter()
        .map(|id| {
            let device = ClDevice::new(id);
            DeviceInfo {
                name: device.name().unwrap_or_default().trim().to_string(),
                vendor: device.vendor().unwrap_or_default().trim().to_string(),
            }
        })
        .collect())
}

fn unavailable(err: impl std::fmt::Display) -> DeviceError {
    DeviceError::Unavailable {
        reason: err.to_string(),
    }
}

fn allocation(err: impl std::fmt::Display) -> DeviceError {
    DeviceError::Allocation {
        reason: err.to_string(),
    }
}

fn transfer(err: impl std::fmt::Display) -> DeviceError {
    DeviceError::Transfer {
        reason: err.to_string(),
    }
}

enum Memory {
    Buffer {
        buffer: Buffer<u8>,
        len: usize,
    },
    Image {
        image: Image,
        region: [usize; 3],
        len: usize,
    },
}

struct SvmRegion {
    ptr: *mut c_void,
    len: usize,
}

/// [`Device`] backed by an OpenCL runtime
pub struct OpenClDevice {
    device_id: cl_device_id,
    info: DeviceInfo,
    context: Context,
    queue: CommandQueue,
    programs: Vec<Program>,
    kernels: Vec<Kernel>,
    memories: Vec<Memory>,
    regions: Vec<SvmRegion>,
    samplers: Vec<Sampler>,
}

impl std::fmt::Debug for OpenClDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenClDevice")
            .field("info", &self.info)
            .field("programs", &self.programs.len())
            .field("kernels", &self.kernels.len())
            .field("memories", &self.memories.len())
            .field("regions", &self.regions.len())
            .finish_non_exhaustive()
    }
}

impl OpenClDevice {
    /// Open the first available device.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Unavailable`] if there is no device or the
    /// context or queue cannot be created.
    pub fn first() -> DeviceResult<Self> {
        let ids = get_all_devices(CL_DEVICE_TYPE_ALL).map_err(unavailable)?;
        let device_id = *ids.first().ok_or_else(|| unavailable("no OpenCL device found"))?;
        let device = ClDevice::new(device_id);
        let info = DeviceInfo {
            name: device.name().unwrap_or_default().trim().to_string(),
            vendor: device.vendor().unwrap_or_default().trim().to_string(),
        };
        let context = Context::from_device(&device).map_err(unavailable)?;

        #[allow(deprecated)]
        let queue = CommandQueue::create_default(&context, 0).map_err(unavailable)?;

        tracing::info!(device = %info, "OpenCL device opened");
        Ok(Self {
            device_id,
            info,
            context,
            queue,
            programs: Vec::new(),
            kernels: Vec::new(),
            memories: Vec::new(),
            regions: Vec::new(),
            samplers: Vec::new(),
        })
    }

    fn finish_build(&self, program: &mut Program, options: &str) -> DeviceResult<()> {
        program.build(&[self.device_id], options).map_err(|e| {
            let log = program
                .get_build_log(self.device_id)
                .ok()
                .filter(|log| !log.trim().is_empty())
                .unwrap_or_else(|| e.to_string());
            DeviceError::BuildFailed { log }
        })
    }

    fn push_program(&mut self, program: Program) -> ProgramId {
        let id = ProgramId(next_handle(self.programs.len()));
        self.programs.push(program);
        id
    }

    fn image_desc(descriptor: &ImageDescriptor) -> (cl_image_desc, [usize; 3]) {
        let (width, height, depth) = match descriptor.shape {
            ImageShape::D1 { width } => (width, 1, 1),
            ImageShape::D2 { width, height } => (width, height, 1),
            ImageShape::D3 {
                width,
                height,
                depth,
            } => (width, height, depth),
        };
        let (width, height, depth) = (width as usize, height as usize, depth as usize);
        let (image_height, image_depth, array_size) = match descriptor.image_type {
            ImageType::Image1D | ImageType::Image1DBuffer => (0, 0, 0),
            ImageType::Image1DArray => (0, 0, height),
            ImageType::Image2D => (height, 0, 0),
            ImageType::Image2DArray => (height, 0, depth),
            ImageType::Image3D | ImageType::Unknown(_) => (height, depth, 0),
        };
        let desc = cl_image_desc {
            image_type: descriptor.image_type.code(),
            image_width: width,
            image_height,
            image_depth,
            image_array_size: array_size,
            image_row_pitch: 0,
            image_slice_pitch: 0,
            num_mip_levels: 0,
            num_samples: 0,
            buffer: ptr::null_mut(),
        };
        (desc, [width, height, depth])
    }
}

impl Drop for OpenClDevice {
    fn drop(&mut self) {
        let _ = self.queue.finish();
        for region in self.regions.drain(..) {
            // SAFETY: allocated by svm_alloc on this context and no longer in use after finish.
            let _ = unsafe { cl3::memory::svm_free(self.context.get(), region.ptr) };
        }
    }
}

impl Device for OpenClDevice {
    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn build_program(
        &mut self,
        source: ProgramSource<'_>,
        options: &str,
    ) -> DeviceResult<ProgramId> {
        let program = match source {
            ProgramSource::Source(text) => {
                Program::create_and_build_from_source(&self.context, text, options)
                    .map_err(|log| DeviceError::BuildFailed { log })?
            }
            ProgramSource::Il(bytes) => {
                let mut program = Program::create_from_il(&self.context, bytes)
                    .map_err(|e| DeviceError::BuildFailed { log: e.to_string() })?;
                self.finish_build(&mut program, options)?;
                program
            }
            ProgramSource::Binary(bytes) => {
                // SAFETY: the binary is only handed to the runtime, which validates it.
                let mut program = unsafe {
                    Program::create_from_binary(&self.context, &[self.device_id], &[bytes])
                }
                .map_err(|e| DeviceError::BuildFailed { log: e.to_string() })?;
                self.finish_build(&mut program, options)?;
                program
            }
        };
        Ok(self.push_program(program))
    }

    fn create_kernel(&mut self, program: ProgramId, name: &str) -> DeviceResult<KernelId> {
        let built = self
            .programs
            .get(program.index())
            .ok_or_else(|| program.invalid())?;
        let kernel = Kernel::create(built, name).map_err(|_| DeviceError::EntryPointMissing {
            name: name.to_string(),
        })?;
        let id = KernelId(next_handle(self.kernels.len()));
        self.kernels.push(kernel);
        Ok(id)
    }

    fn kernel_arity(&self, kernel: KernelId) -> Option<u32> {
        self.kernels.get(kernel.index())?.num_args().ok()
    }

    fn create_buffer(&mut self, contents: &[u8], len: usize) -> DeviceResult<MemId> {
        let mut seeded = vec![0u8; len.max(contents.len()).max(1)];
        seeded[..contents.len()].copy_from_slice(contents);
        // SAFETY: the host pointer is copied during creation and outlives the call.
        let buffer = unsafe {
            Buffer::<u8>::create(
                &self.context,
                CL_MEM_READ_WRITE | CL_MEM_COPY_HOST_PTR,
                seeded.len(),
                seeded.as_mut_ptr().cast::<c_void>(),
            )
        }
        .map_err(allocation)?;
        let id = MemId(next_handle(self.memories.len()));
        self.memories.push(Memory::Buffer {
            buffer,
            len: seeded.len(),
        });
        Ok(id)
    }

    fn create_image(
        &mut self,
        descriptor: &ImageDescriptor,
        contents: &[u8],
    ) -> DeviceResult<MemId> {
        let format = cl_image_format {
            image_channel_order: descriptor.format.channel_order,
            image_channel_data_type: descriptor.format.channel_data_type,
        };
        let (desc, region) = Self::image_desc(descriptor);
        // SAFETY: format and descriptor live across the call; no host pointer.
        let mut image = unsafe {
            Image::create(
                &self.context,
                CL_MEM_READ_WRITE,
                &format,
                &desc,
                ptr::null_mut(),
            )
        }
        .map_err(allocation)?;
        let len = image.element_size().map_err(allocation)? * region.iter().product::<usize>();

        let mut host = vec![0u8; len];
        let copied = contents.len().min(len);
        host[..copied].copy_from_slice(&contents[..copied]);
        // SAFETY: `host` covers the full region and the write blocks.
        unsafe {
            self.queue.enqueue_write_image(
                &mut image,
                CL_BLOCKING,
                [0usize; 3].as_ptr(),
                region.as_ptr(),
                0,
                0,
                host.as_mut_ptr().cast::<c_void>(),
                &[],
            )
        }
        .map_err(allocation)?;

        let id = MemId(next_handle(self.memories.len()));
        self.memories.push(Memory::Image { image, region, len });
        Ok(id)
    }

    fn create_svm(&mut self, contents: &[u8], len: usize) -> DeviceResult<SvmId> {
        let len = len.max(contents.len()).max(1);
        // SAFETY: plain allocation on a live context; checked for null below.
        let ptr = unsafe {
            cl3::memory::svm_alloc(
                self.context.get(),
                CL_MEM_READ_WRITE,
                len,
                0,
            )
        }
        .map_err(|code| DeviceError::Unsupported {
            what: format!("shared virtual memory (error {code})"),
        })?;
        if ptr.is_null() {
            return Err(DeviceError::Unsupported {
                what: "shared virtual memory".to_string(),
            });
        }
        let mut seeded = vec![0u8; len];
        seeded[..contents.len()].copy_from_slice(contents);
        // SAFETY: blocking copy into a region of at least `len` bytes.
        unsafe {
            self.queue.enqueue_svm_mem_cpy(
                CL_BLOCKING,
                ptr,
                seeded.as_ptr().cast::<c_void>(),
                len,
                &[],
            )
        }
        .map_err(allocation)?;
        let id = SvmId(next_handle(self.regions.len()));
        self.regions.push(SvmRegion { ptr, len });
        Ok(id)
    }

    fn create_sampler(&mut self, descriptor: &SamplerDescriptor) -> DeviceResult<SamplerId> {
        #[allow(deprecated)]
        let sampler = Sampler::create(
            &self.context,
            cl_bool::from(descriptor.normalized),
            descriptor.addressing.code(),
            descriptor.filter.code(),
        )
        .map_err(allocation)?;
        let id = SamplerId(next_handle(self.samplers.len()));
        self.samplers.push(sampler);
        Ok(id)
    }

    fn bind(
        &mut self,
        kernel: KernelId,
        position: Position,
        arg: KernelArg<'_>,
    ) -> DeviceResult<()> {
        let target = self
            .kernels
            .get(kernel.index())
            .ok_or_else(|| kernel.invalid())?;
        let binding = |reason: String| DeviceError::Binding { position, reason };
        // SAFETY: every pointer handed to the runtime refers to a live object
        // owned by this device, and scalar bytes are read during the call.
        let result = unsafe {
            match arg {
                KernelArg::Scalar(bytes) => cl3::kernel::set_kernel_arg(
                    target.get(),
                    position,
                    bytes.len(),
                    bytes.as_ptr().cast::<c_void>(),
                )
                .map_err(|code| format!("error {code}")),
                KernelArg::Buffer(id) | KernelArg::Image(id) => {
                    let mem = match self.memories.get(id.index()).ok_or_else(|| id.invalid())? {
                        Memory::Buffer { buffer, .. } => buffer.get(),
                        Memory::Image { image, .. } => image.get(),
                    };
                    target.set_arg(position, &mem).map_err(|e| e.to_string())
                }
                KernelArg::Svm { region, offset } => {
                    let svm = self
                        .regions
                        .get(region.index())
                        .ok_or_else(|| region.invalid())?;
                    let offset = usize::try_from(offset)
                        .ok()
                        .filter(|o| *o <= svm.len)
                        .ok_or_else(|| binding(format!("offset {offset} outside region")))?;
                    let ptr = svm.ptr.cast::<u8>().add(offset).cast::<c_void>();
                    target
                        .set_arg_svm_pointer(position, ptr)
                        .map_err(|e| e.to_string())
                }
                KernelArg::Local(size) => target
                    .set_arg_local_buffer(position, size as usize)
                    .map_err(|e| e.to_string()),
                KernelArg::Sampler(id) => {
                    let sampler = self.samplers.get(id.index()).ok_or_else(|| id.invalid())?;
                    target
                        .set_arg(position, &sampler.get())
                        .map_err(|e| e.to_string())
                }
            }
        };
        result.map_err(binding)
    }

    fn launch(&mut self, kernel: KernelId, geometry: &LaunchGeometry) -> DeviceResult<()> {
        let target = self
            .kernels
            .get(kernel.index())
            .ok_or_else(|| kernel.invalid())?;
        let to_sizes = |v: &[u64]| v.iter().map(|x| *x as usize).collect::<Vec<usize>>();
        let global = to_sizes(geometry.global());
        let offset = to_sizes(geometry.offset());
        let local = geometry.local().map(to_sizes);
        let local_ptr = local.as_ref().map_or(ptr::null(), |l| l.as_ptr());
        // SAFETY: size arrays match the work dimension and outlive the call.
        unsafe {
            self.queue.enqueue_nd_range_kernel(
                target.get(),
                geometry.dimensions() as u32,
                offset.as_ptr(),
                global.as_ptr(),
                local_ptr,
                &[],
            )
        }
        .map_err(|e| DeviceError::Launch {
            reason: e.to_string(),
        })?;
        Ok(())
    }

    fn read_back(&mut self, requests: &mut [ReadRequest]) -> DeviceResult<()> {
        let last = requests.len().saturating_sub(1);
        for (index, request) in requests.iter_mut().enumerate() {
            let len = request.data.len();
            // Zero-byte reads are invalid in OpenCL.
            if len == 0 {
                continue;
            }
            // Only the final read blocks; the queue is in order.
            let blocking = if index == last {
                CL_BLOCKING
            } else {
                CL_NON_BLOCKING
            };
            let too_long = |available: usize| {
                transfer(format!(
                    "requested {len} bytes from a {available}-byte object"
                ))
            };
            // SAFETY: destinations live in `requests`, which outlives the
            // blocking read and the finish below, and never exceed the
            // source object.
            unsafe {
                match request.source {
                    ReadSource::Buffer(id) => match self.memories.get(id.index()) {
                        Some(Memory::Buffer { buffer, len: size }) => {
                            if len > *size {
                                return Err(too_long(*size));
                            }
                            self.queue
                                .enqueue_read_buffer(buffer, blocking, 0, &mut request.data, &[])
                                .map(drop)
                                .map_err(transfer)?;
                        }
                        _ => return Err(id.invalid()),
                    },
                    ReadSource::Image(id) => match self.memories.get(id.index()) {
                        Some(Memory::Image {
                            image,
                            region,
                            len: size,
                        }) => {
                            // The runtime always writes the full region.
                            let mut full = vec![0u8; *size];
                            self.queue
                                .enqueue_read_image(
                                    image,
                                    CL_BLOCKING,
                                    [0usize; 3].as_ptr(),
                                    region.as_ptr(),
                                    0,
                                    0,
                                    full.as_mut_ptr().cast::<c_void>(),
                                    &[],
                                )
                                .map(drop)
                                .map_err(transfer)?;
                            let copied = len.min(full.len());
                            request.data[..copied].copy_from_slice(&full[..copied]);
                        }
                        _ => return Err(id.invalid()),
                    },
                    ReadSource::Svm(id) => {
                        let svm = self.regions.get(id.index()).ok_or_else(|| id.invalid())?;
                        if len > svm.len {
                            return Err(too_long(svm.len));
                        }
                        self.queue
                            .enqueue_svm_mem_cpy(
                                blocking,
                                request.data.as_mut_ptr().cast::<c_void>(),
                                svm.ptr,
                                len,
                                &[],
                            )
                            .map(drop)
                            .map_err(transfer)?;
                    }
                }
            }
        }
        self.queue.finish().map_err(transfer)
    }
}
