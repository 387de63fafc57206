//! Argument binding.

use crate::device::{Device, KernelArg, KernelId, MemId, ReadSource, SamplerId, SvmId};
use crate::error::{ReplayError, ReplayResult};
use kreplay_capture::{AliasPlan, OutputKind};
use kreplay_core::{ArgumentKind, ArgumentTable, Position};
use std::collections::HashMap;

/// One output to read back after the launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSlot {
    /// Argument position
    pub position: Position,
    /// Output file kind
    pub kind: OutputKind,
    /// Memory object holding the content
    pub source: ReadSource,
    /// Bytes to read, the length of the position's pre-state
    pub len: usize,
}

/// Result of binding every argument
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    /// Positions bound
    pub bound: usize,
    /// Device allocations created
    pub allocations: usize,
    /// Outputs in ascending position order
    pub outputs: Vec<OutputSlot>,
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Buffer(MemId),
    Svm(SvmId, u64),
    Image(MemId),
    Sampler(SamplerId),
}

/// Binds a captured argument table to a kernel
pub struct ArgumentBinder<'a> {
    table: &'a ArgumentTable,
    plan: &'a AliasPlan,
}

impl<'a> ArgumentBinder<'a> {
    /// Binder for a table and its allocation plan
    #[must_use]
    pub fn new(table: &'a ArgumentTable, plan: &'a AliasPlan) -> Self {
        Self { table, plan }
    }

    fn pre_len(&self, position: Position) -> usize {
        self.table
            .get(position)
            .and_then(ArgumentKind::pre_state)
            .map_or(0, <[u8]>::len)
    }

    fn pre_state(&self, position: Position) -> &'a [u8] {
        self.table
            .get(position)
            .and_then(ArgumentKind::pre_state)
            .unwrap_or_default()
    }

    /// Allocate device objects and bind every position in order.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::ArityMismatch`] when the device reports an
    /// arity different from the captured argument count, or the first
    /// device error raised while allocating or binding.
    pub fn bind(&self, device: &mut dyn Device, kernel: KernelId) -> ReplayResult<Bindings> {
        if let Some(expected) = device.kernel_arity(kernel) {
            if expected as usize != self.table.len() {
                return Err(ReplayError::ArityMismatch {
                    expected,
                    actual: self.table.len(),
                });
            }
        }

        let mut targets: HashMap<Position, Target> = HashMap::new();
        let mut allocations = 0;

        for group in &self.plan.buffer_groups {
            let len = group
                .positions
                .iter()
                .map(|pos| self.pre_len(*pos))
                .max()
                .unwrap_or(0);
            let mem = device.create_buffer(self.pre_state(group.representative()), len)?;
            allocations += 1;
            for position in &group.positions {
                targets.insert(*position, Target::Buffer(mem));
            }
        }

        for group in &self.plan.svm_groups {
            let len = group
                .positions()
                .map(|pos| self.pre_len(pos))
                .max()
                .unwrap_or(0);
            let region = device.create_svm(self.pre_state(group.representative()), len)?;
            allocations += 1;
            for (position, offset) in &group.members {
                targets.insert(*position, Target::Svm(region, *offset));
            }
        }

        for (position, kind) in self.table.iter() {
            match kind {
                ArgumentKind::Image {
                    descriptor,
                    pre_state,
                } => {
                    let mem = device.create_image(descriptor, pre_state)?;
                    allocations += 1;
                    targets.insert(position, Target::Image(mem));
                }
                ArgumentKind::Sampler { descriptor } => {
                    let sampler = device.create_sampler(descriptor)?;
                    targets.insert(position, Target::Sampler(sampler));
                }
                _ => {}
            }
        }

        let mut bindings = Bindings {
            allocations,
            ..Bindings::default()
        };

        for (position, kind) in self.table.iter() {
            let arg = match kind {
                ArgumentKind::Scalar { bytes } => KernelArg::Scalar(bytes),
                ArgumentKind::Local { size } => KernelArg::Local(*size),
                _ => match targets.get(&position) {
                    Some(Target::Buffer(mem)) => KernelArg::Buffer(*mem),
                    Some(Target::Image(mem)) => KernelArg::Image(*mem),
                    Some(Target::Svm(region, offset)) => KernelArg::Svm {
                        region: *region,
                        offset: *offset,
                    },
                    Some(Target::Sampler(sampler)) => KernelArg::Sampler(*sampler),
                    None => {
                        return Err(ReplayError::InvalidConfig {
                            reason: format!(
                                "{} argument {} has no allocation",
                                kind.name(),
                                position
                            ),
                        });
                    }
                },
            };
            tracing::debug!(position, kind = arg.kind(), "Binding argument");
            device.bind(kernel, position, arg)?;
            bindings.bound += 1;

            let output = match arg {
                KernelArg::Buffer(mem) => Some((OutputKind::Buffer, ReadSource::Buffer(mem))),
                KernelArg::Svm { region, .. } => Some((OutputKind::Buffer, ReadSource::Svm(region))),
                KernelArg::Image(mem) => Some((OutputKind::Image, ReadSource::Image(mem))),
                _ => None,
            };
            if let Some((kind, source)) = output {
                bindings.outputs.push(OutputSlot {
                    position,
                    kind,
                    source,
                    len: self.pre_len(position),
                });
            }
        }

        Ok(bindings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ProgramSource;
    use crate::sim::{SimArg, SimDevice};
    use kreplay_core::{AddressingMode, FilterMode, SamplerDescriptor};

    fn kernel(device: &mut SimDevice) -> KernelId {
        let program = device
            .build_program(ProgramSource::Source("kernel void foo"), "")
            .unwrap();
        device.create_kernel(program, "foo").unwrap()
    }

    fn buffer(token: &[u8], pre: Vec<u8>) -> ArgumentKind {
        ArgumentKind::Buffer {
            identity: Some(token.to_vec()),
            pre_state: pre,
        }
    }

    #[test]
    fn test_aliased_buffers_share_one_allocation() {
        let mut table = ArgumentTable::new();
        table.claim(0, buffer(b"A", vec![1; 8])).unwrap();
        table.claim(1, buffer(b"A", vec![2; 8])).unwrap();
        table.offer_scalar(2, vec![8, 0, 0, 0]);
        let plan = AliasPlan::resolve(&table);

        let mut device = SimDevice::new();
        let kernel = kernel(&mut device);
        let bindings = ArgumentBinder::new(&table, &plan)
            .bind(&mut device, kernel)
            .unwrap();

        assert_eq!(bindings.bound, 3);
        assert_eq!(bindings.allocations, 1);
        assert_eq!(device.memory_count(), 1);
        assert_eq!(bindings.outputs.len(), 2);
        assert_eq!(bindings.outputs[0].source, bindings.outputs[1].source);
        assert!(bindings.outputs.iter().all(|o| o.len == 8));
    }

    #[test]
    fn test_every_kind_binds() {
        let mut table = ArgumentTable::new();
        table.claim(0, buffer(b"A", vec![0; 4])).unwrap();
        table.claim(1, ArgumentKind::Local { size: 256 }).unwrap();
        table
            .claim(
                2,
                ArgumentKind::Sampler {
                    descriptor: SamplerDescriptor {
                        normalized: false,
                        addressing: AddressingMode::Clamp,
                        filter: FilterMode::Nearest,
                    },
                },
            )
            .unwrap();
        table.offer_scalar(3, vec![1]);
        let plan = AliasPlan::resolve(&table);

        let mut device = SimDevice::new();
        let kernel = kernel(&mut device);
        ArgumentBinder::new(&table, &plan)
            .bind(&mut device, kernel)
            .unwrap();
        device
            .launch(kernel, &kreplay_core::LaunchGeometry::parse("1\n0\n0\n").unwrap())
            .unwrap();

        let args = &device.launches()[0].args;
        assert!(matches!(args.get(&0), Some(SimArg::Buffer(_))));
        assert_eq!(args.get(&1), Some(&SimArg::Local(256)));
        assert!(matches!(args.get(&2), Some(SimArg::Sampler(_))));
        assert_eq!(args.get(&3), Some(&SimArg::Scalar(vec![1])));
    }

    #[test]
    fn test_svm_members_bind_at_offsets() {
        let mut table = ArgumentTable::new();
        for (pos, offset) in [(0u32, 0u64), (1, 16)] {
            table
                .claim(
                    pos,
                    ArgumentKind::Svm {
                        identity: Some(b"base".to_vec()),
                        pre_state: vec![0; 32],
                        offset,
                    },
                )
                .unwrap();
        }
        let plan = AliasPlan::resolve(&table);

        let mut device = SimDevice::new();
        let kernel = kernel(&mut device);
        let bindings = ArgumentBinder::new(&table, &plan)
            .bind(&mut device, kernel)
            .unwrap();
        assert_eq!(device.region_count(), 1);
        assert_eq!(bindings.outputs.len(), 2);
        assert!(bindings.outputs.iter().all(|o| o.len == 32));
    }

    #[test]
    fn test_arity_mismatch() {
        let mut table = ArgumentTable::new();
        table.offer_scalar(0, vec![0; 4]);
        let plan = AliasPlan::resolve(&table);

        let mut device = SimDevice::new().with_arity("foo", 2);
        let kernel = kernel(&mut device);
        let err = ArgumentBinder::new(&table, &plan)
            .bind(&mut device, kernel)
            .unwrap_err();
        assert_eq!(
            err,
            ReplayError::ArityMismatch {
                expected: 2,
                actual: 1
            }
        );
    }
}
