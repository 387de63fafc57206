//! Capture directory reader.

use crate::error::{CaptureError, CaptureResult};
use crate::naming::{self, FilePattern};
use crate::record::{Capture, InvocationDescriptor, NamedBlob, ProgramCandidate};
use kreplay_core::error::parse_u64;
use kreplay_core::{
    ArgumentKind, ArgumentTable, EnqueueIndex, ImageDescriptor, LaunchGeometry, Notice,
    NoticeLog, Position, SamplerDescriptor,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Reader configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderOptions {
    /// Bind buffers as SVM regions even when every recorded offset is zero
    pub force_svm: bool,
}

/// Reads one capture directory into a [`Capture`]
#[derive(Debug, Clone)]
pub struct CaptureReader {
    root: PathBuf,
    options: ReaderOptions,
}

impl CaptureReader {
    /// Create a reader for a working directory
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            options: ReaderOptions::default(),
        }
    }

    /// Set reader options
    #[must_use]
    pub fn with_options(mut self, options: ReaderOptions) -> Self {
        self.options = options;
        self
    }

    /// Read and decode the whole capture.
    ///
    /// # Errors
    ///
    /// Fails on the first missing or malformed required artifact.
    pub fn read(&self) -> CaptureResult<Capture> {
        let invocation = self.read_invocation()?;
        let mut notices = NoticeLog::new();
        let (arguments, svm_active) = self.read_arguments(invocation.enqueue, &mut notices)?;
        let program = self.read_program()?;

        tracing::info!(
            enqueue = %invocation.enqueue,
            kernel = %invocation.kernel_name,
            arguments = arguments.len(),
            program = program.tier(),
            svm = svm_active,
            "Capture decoded"
        );

        Ok(Capture {
            root: self.root.clone(),
            invocation,
            arguments,
            program,
            svm_active,
            notices,
        })
    }

    /// Read the enqueue index alone
    ///
    /// # Errors
    ///
    /// Fails if `enqueueNumber.txt` is missing or not an integer.
    pub fn read_enqueue_index(&self) -> CaptureResult<EnqueueIndex> {
        let path = self.root.join(naming::ENQUEUE_NUMBER_FILE);
        let text = read_text(&path)?;
        let first = text.lines().next().unwrap_or_default();
        parse_u64("enqueue number", first)
            .map(EnqueueIndex::new)
            .map_err(|e| CaptureError::malformed(&path, e))
    }

    /// Read enqueue index, entry point, build options and geometry.
    ///
    /// # Errors
    ///
    /// Fails if any of the four fixed-name files is missing or malformed.
    pub fn read_invocation(&self) -> CaptureResult<InvocationDescriptor> {
        let enqueue = self.read_enqueue_index()?;

        let name_path = self.root.join(naming::KERNEL_NAME_FILE);
        let kernel_name = strip_trailing_newline(read_text(&name_path)?);

        let options_path = self.root.join(naming::BUILD_OPTIONS_FILE);
        let build_options = read_text(&options_path)?
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        let geometry_path = self.root.join(naming::WORK_SIZES_FILE);
        let geometry = LaunchGeometry::parse(&read_text(&geometry_path)?)
            .map_err(|e| CaptureError::malformed(&geometry_path, e))?;

        tracing::debug!(%geometry, "Launch geometry");

        Ok(InvocationDescriptor {
            enqueue,
            kernel_name,
            build_options,
            geometry,
        })
    }

    fn read_arguments(
        &self,
        enqueue: EnqueueIndex,
        notices: &mut NoticeLog,
    ) -> CaptureResult<(ArgumentTable, bool)> {
        let mut payloads: BTreeMap<Position, Vec<u8>> = BTreeMap::new();
        for (position, path) in scan(&self.root, &naming::argument_pattern())? {
            payloads.insert(position, read_bytes(&path)?);
        }

        let mut offsets: BTreeMap<Position, u64> = BTreeMap::new();
        for (position, path) in scan(&self.root, &naming::svm_offset_pattern())? {
            let offset = parse_u64("svm offset", &read_text(&path)?)
                .map_err(|e| CaptureError::malformed(&path, e))?;
            offsets.insert(position, offset);
        }
        let nonzero: Vec<Position> = offsets
            .iter()
            .filter(|(_, offset)| **offset != 0)
            .map(|(pos, _)| *pos)
            .collect();
        let svm_active = self.options.force_svm || !nonzero.is_empty();
        if !nonzero.is_empty() && !self.options.force_svm {
            tracing::info!(positions = ?nonzero, "Non-zero SVM offsets found, enabling SVM");
            notices.push(Notice::SvmForced { positions: nonzero });
        }

        let mut table = ArgumentTable::new();
        let pre_dir = self.root.join(naming::PRE_DIR);

        for (position, path) in scan(&pre_dir, &naming::pre_buffer_pattern(enqueue))? {
            let pre_state = read_bytes(&path)?;
            let identity = payloads.get(&position).cloned();
            let kind = if svm_active {
                ArgumentKind::Svm {
                    identity,
                    pre_state,
                    offset: offsets.get(&position).copied().unwrap_or(0),
                }
            } else {
                ArgumentKind::Buffer {
                    identity,
                    pre_state,
                }
            };
            tracing::debug!(position, kind = kind.name(), file = %path.display(), "Buffer argument");
            table
                .claim(position, kind)
                .map_err(|e| CaptureError::malformed(&path, e))?;
        }

        if svm_active {
            let buffer_pattern = naming::pre_buffer_pattern(enqueue);
            if let Some(orphan) = offsets.keys().find(|pos| table.get(**pos).is_none()) {
                return Err(CaptureError::missing(
                    pre_dir.join(format!("{} (argument {})", buffer_pattern.glob(), orphan)),
                ));
            }
        }

        for (position, path) in scan(&pre_dir, &naming::pre_image_pattern(enqueue))? {
            let meta_path = self.root.join(naming::image_metadata_name(position));
            let descriptor = ImageDescriptor::parse_metadata(&read_text(&meta_path)?)
                .map_err(|e| CaptureError::malformed(&meta_path, e))?;
            if let kreplay_core::ImageType::Unknown(code) = descriptor.image_type {
                tracing::warn!(position, code, "Unknown image type code, assuming 3-D");
                notices.push(Notice::ImageTypeFallback { position, code });
            }
            let pre_state = read_bytes(&path)?;
            descriptor
                .check_len(pre_state.len())
                .map_err(|e| CaptureError::malformed(&path, e))?;
            tracing::debug!(position, %descriptor, "Image argument");
            table
                .claim(
                    position,
                    ArgumentKind::Image {
                        descriptor,
                        pre_state,
                    },
                )
                .map_err(|e| CaptureError::malformed(&path, e))?;
        }

        for (position, path) in scan(&self.root, &naming::sampler_pattern())? {
            let text = read_text(&path)?;
            let descriptor = SamplerDescriptor::parse(text.lines().next().unwrap_or_default());
            tracing::debug!(position, %descriptor, "Sampler argument");
            table
                .claim(position, ArgumentKind::Sampler { descriptor })
                .map_err(|e| CaptureError::malformed(&path, e))?;
        }

        for (position, path) in scan(&self.root, &naming::local_pattern())? {
            let size = parse_u64("local size", &read_text(&path)?)
                .map_err(|e| CaptureError::malformed(&path, e))?;
            tracing::debug!(position, size, "Local argument");
            table
                .claim(position, ArgumentKind::Local { size })
                .map_err(|e| CaptureError::malformed(&path, e))?;
        }

        for (position, bytes) in payloads {
            if table.offer_scalar(position, bytes) {
                tracing::debug!(position, "Scalar argument");
            }
        }

        if !table.is_contiguous() {
            tracing::warn!(
                positions = ?table.iter().map(|(p, _)| p).collect::<Vec<_>>(),
                "Argument positions have gaps"
            );
        }

        Ok((table, svm_active))
    }

    /// Determine the program form, in priority order source, IL, binaries.
    ///
    /// # Errors
    ///
    /// Fails if none of the three forms is present.
    pub fn read_program(&self) -> CaptureResult<ProgramCandidate> {
        let source = self.root.join(naming::SOURCE_FILE);
        if source.is_file() {
            return Ok(ProgramCandidate::Source(read_text(&source)?));
        }
        let il = self.root.join(naming::IL_FILE);
        if il.is_file() {
            return Ok(ProgramCandidate::Il(read_bytes(&il)?));
        }

        let mut blobs = Vec::new();
        for path in scan_all(&self.root, &naming::device_binary_pattern())? {
            let name = file_name(&path).unwrap_or_default().to_string();
            blobs.push(NamedBlob {
                name,
                bytes: read_bytes(&path)?,
            });
        }
        if blobs.is_empty() {
            return Err(CaptureError::missing(self.root.join(format!(
                "{} | {} | {}",
                naming::SOURCE_FILE,
                naming::IL_FILE,
                naming::device_binary_pattern().glob()
            ))));
        }
        Ok(ProgramCandidate::Binaries(blobs))
    }
}

/// Read a whole file as bytes
///
/// # Errors
///
/// Missing files map to [`CaptureError::MissingArtifact`].
pub fn read_bytes(path: &Path) -> CaptureResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| CaptureError::from_io(path, &e))
}

/// Read a whole file as UTF-8 text
///
/// # Errors
///
/// Missing files map to [`CaptureError::MissingArtifact`].
pub fn read_text(path: &Path) -> CaptureResult<String> {
    std::fs::read_to_string(path).map_err(|e| CaptureError::from_io(path, &e))
}

/// Files in `dir` matching `pattern`, keyed by embedded argument position.
///
/// A missing directory yields no files. Names without a position are skipped.
///
/// # Errors
///
/// Fails if the directory cannot be listed or two files share a position.
pub fn scan(dir: &Path, pattern: &FilePattern) -> CaptureResult<Vec<(Position, PathBuf)>> {
    let mut found: BTreeMap<Position, PathBuf> = BTreeMap::new();
    for path in scan_all(dir, pattern)? {
        let Some(position) = file_name(&path).and_then(naming::argument_position) else {
            tracing::debug!(file = %path.display(), "No argument position in file name, skipping");
            continue;
        };
        if let Some(first) = found.get(&position) {
            return Err(CaptureError::DuplicateArtifact {
                position,
                first: first.clone(),
                second: path,
            });
        }
        found.insert(position, path);
    }
    Ok(found.into_iter().collect())
}

/// All files in `dir` matching `pattern`, in discovery order.
///
/// # Errors
///
/// Fails if the directory exists but cannot be listed.
pub fn scan_all(dir: &Path, pattern: &FilePattern) -> CaptureResult<Vec<PathBuf>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CaptureError::from_io(dir, &e)),
    };
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CaptureError::from_io(dir, &e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if file_name(&path).is_some_and(|name| pattern.matches(name)) {
            paths.push(path);
        }
    }
    paths.sort_by_key(|p| naming::discovery_key(file_name(p).unwrap_or_default()));
    Ok(paths)
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

fn strip_trailing_newline(mut text: String) -> String {
    if text.ends_with('\n') {
        text.pop();
        if text.ends_with('\r') {
            text.pop();
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use kreplay_core::{AddressingMode, FilterMode};
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, bytes: &[u8]) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, bytes).unwrap();
    }

    fn minimal_capture(geometry: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "enqueueNumber.txt", b"1\n");
        write(dir.path(), "knlName.txt", b"foo\n");
        write(dir.path(), "buildOptions.txt", b"-cl-std=CL2.0\n\n-DWIDTH=4  \n");
        write(dir.path(), "worksizes.txt", geometry.as_bytes());
        write(dir.path(), "kernel.cl", b"__kernel void foo(int x) {}");
        dir
    }

    #[test]
    fn test_scalar_only_capture() {
        let dir = minimal_capture("256\n0\n0\n");
        write(dir.path(), "Argument0.bin", &[1, 0, 0, 0]);

        let capture = CaptureReader::new(dir.path()).read().unwrap();
        assert_eq!(capture.invocation.enqueue, EnqueueIndex::new(1));
        assert_eq!(capture.invocation.kernel_name, "foo");
        assert_eq!(
            capture.invocation.build_options,
            vec!["-cl-std=CL2.0".to_string(), "-DWIDTH=4".to_string()]
        );
        assert_eq!(capture.invocation.geometry.local(), None);
        assert_eq!(
            capture.arguments.get(0),
            Some(&ArgumentKind::Scalar {
                bytes: vec![1, 0, 0, 0]
            })
        );
        assert!(capture.output_positions().is_empty());
        assert!(matches!(capture.program, ProgramCandidate::Source(_)));
        assert!(!capture.svm_active);
    }

    #[test]
    fn test_kernel_name_keeps_inner_whitespace() {
        let dir = minimal_capture("1\n0\n0\n");
        write(dir.path(), "knlName.txt", b"my kernel \n");
        let desc = CaptureReader::new(dir.path()).read_invocation().unwrap();
        assert_eq!(desc.kernel_name, "my kernel ");
    }

    #[test]
    fn test_missing_required_file_is_fatal() {
        let dir = minimal_capture("1\n0\n0\n");
        std::fs::remove_file(dir.path().join("worksizes.txt")).unwrap();
        let err = CaptureReader::new(dir.path()).read().unwrap_err();
        assert_eq!(err, CaptureError::missing(dir.path().join("worksizes.txt")));
    }

    #[test]
    fn test_buffers_images_samplers_locals() {
        let dir = minimal_capture("16 16\n4 4\n0 0\n");
        let ptr = 0xDEAD_BEEFu64.to_le_bytes();
        write(dir.path(), "Argument0.bin", &ptr);
        write(dir.path(), "Argument1.bin", &[7, 0, 0, 0]);
        write(dir.path(), "Argument2.bin", &[0; 8]);
        write(dir.path(), "Argument3.bin", &[0; 8]);
        write(dir.path(), "Pre/Enqueue_0001_Kernel_foo_Arg_0_Buffer.bin", &[1; 64]);
        write(dir.path(), "Pre/Enqueue_0001_Kernel_foo_Arg_2_Image.raw", &[2; 16 * 16 * 4]);
        write(
            dir.path(),
            "Image_MetaData_2.txt",
            format!("16\n16\n1\n0\n0\n0\n{}\n{}\n{}\n", 0x10B5, 0x10D2, 0x10F1).as_bytes(),
        );
        write(dir.path(), "Sampler3.txt", b"CLK_NORMALIZED_COORDS_FALSE | CLK_ADDRESS_REPEAT | CLK_FILTER_LINEAR\n");
        write(dir.path(), "Local4.txt", b"1024\n");
        // Belongs to another enqueue and must be ignored.
        write(dir.path(), "Pre/Enqueue_0002_Kernel_foo_Arg_1_Buffer.bin", &[9; 4]);

        let capture = CaptureReader::new(dir.path()).read().unwrap();
        let args = &capture.arguments;
        assert_eq!(args.len(), 5);
        assert_eq!(
            args.get(0),
            Some(&ArgumentKind::Buffer {
                identity: Some(ptr.to_vec()),
                pre_state: vec![1; 64]
            })
        );
        assert_eq!(args.get(1).unwrap().name(), "scalar");
        match args.get(2).unwrap() {
            ArgumentKind::Image { descriptor, pre_state } => {
                assert_eq!(descriptor.shape.extent(), vec![16, 16]);
                assert_eq!(pre_state.len(), 1024);
            }
            other => panic!("expected image, got {other:?}"),
        }
        match args.get(3).unwrap() {
            ArgumentKind::Sampler { descriptor } => {
                assert_eq!(descriptor.addressing, AddressingMode::Repeat);
                assert_eq!(descriptor.filter, FilterMode::Linear);
            }
            other => panic!("expected sampler, got {other:?}"),
        }
        assert_eq!(args.get(4), Some(&ArgumentKind::Local { size: 1024 }));
        assert_eq!(capture.output_positions(), vec![0, 2]);
        assert!(capture.notices.is_empty());
    }

    #[test]
    fn test_missing_image_metadata_is_fatal() {
        let dir = minimal_capture("1\n0\n0\n");
        write(dir.path(), "Pre/Enqueue_0001_Kernel_foo_Arg_0.raw", &[0; 4]);
        let err = CaptureReader::new(dir.path()).read().unwrap_err();
        assert_eq!(err, CaptureError::missing(dir.path().join("Image_MetaData_0.txt")));
    }

    #[test]
    fn test_short_image_content_rejected() {
        let dir = minimal_capture("1\n0\n0\n");
        let raw = dir.path().join("Pre/Enqueue_0001_Kernel_foo_Arg_0.raw");
        write(dir.path(), "Pre/Enqueue_0001_Kernel_foo_Arg_0.raw", &[0; 16]);
        write(
            dir.path(),
            "Image_MetaData_0.txt",
            format!("64\n64\n1\n0\n0\n0\n{}\n{}\n{}\n", 0x10B5, 0x10D2, 0x10F1).as_bytes(),
        );
        let err = CaptureReader::new(dir.path()).read().unwrap_err();
        assert!(matches!(err, CaptureError::Malformed { ref path, .. } if *path == raw));
    }

    #[test]
    fn test_unknown_format_accepts_any_image_length() {
        let dir = minimal_capture("1\n0\n0\n");
        write(dir.path(), "Pre/Enqueue_0001_Kernel_foo_Arg_0.raw", &[0; 5]);
        write(dir.path(), "Image_MetaData_0.txt", b"4\n4\n1\n0\n0\n0\n1\n4306\n4337\n");
        let capture = CaptureReader::new(dir.path()).read().unwrap();
        assert_eq!(capture.output_positions(), vec![0]);
    }

    #[test]
    fn test_unknown_image_type_notice() {
        let dir = minimal_capture("1\n0\n0\n");
        write(dir.path(), "Pre/Enqueue_0001_Kernel_foo_Arg_0.raw", &[0; 32]);
        write(dir.path(), "Image_MetaData_0.txt", b"2\n2\n2\n0\n0\n0\n4277\n4306\n77\n");
        let capture = CaptureReader::new(dir.path()).read().unwrap();
        assert_eq!(
            capture.notices.as_slice(),
            &[Notice::ImageTypeFallback {
                position: 0,
                code: 77
            }]
        );
    }

    #[test]
    fn test_nonzero_svm_offset_forces_svm() {
        let dir = minimal_capture("1\n0\n0\n");
        write(dir.path(), "Argument0.bin", &[0xA0; 8]);
        write(dir.path(), "Argument1.bin", &[0xA0; 8]);
        write(dir.path(), "Pre/Enqueue_0001_Kernel_foo_Arg_0_Buffer.bin", &[0; 32]);
        write(dir.path(), "Pre/Enqueue_0001_Kernel_foo_Arg_1_Buffer.bin", &[0; 32]);
        write(dir.path(), "SVM_Arg_Offset0.txt", b"0\n");
        write(dir.path(), "SVM_Arg_Offset1.txt", b"16\n");

        let capture = CaptureReader::new(dir.path()).read().unwrap();
        assert!(capture.svm_active);
        assert_eq!(
            capture.notices.as_slice(),
            &[Notice::SvmForced { positions: vec![1] }]
        );
        match capture.arguments.get(1).unwrap() {
            ArgumentKind::Svm { offset, .. } => assert_eq!(*offset, 16),
            other => panic!("expected svm, got {other:?}"),
        }
    }

    #[test]
    fn test_forced_svm_without_offsets() {
        let dir = minimal_capture("1\n0\n0\n");
        write(dir.path(), "Pre/Enqueue_0001_Kernel_foo_Arg_0_Buffer.bin", &[0; 8]);
        let capture = CaptureReader::new(dir.path())
            .with_options(ReaderOptions { force_svm: true })
            .read()
            .unwrap();
        assert!(capture.svm_active);
        assert!(capture.notices.is_empty());
        assert_eq!(capture.arguments.get(0).unwrap().name(), "svm");
    }

    #[test]
    fn test_svm_offset_without_pre_state_is_fatal() {
        let dir = minimal_capture("1\n0\n0\n");
        write(dir.path(), "SVM_Arg_Offset2.txt", b"8");
        let err = CaptureReader::new(dir.path()).read().unwrap_err();
        assert!(matches!(err, CaptureError::MissingArtifact { .. }));
    }

    #[test]
    fn test_conflicting_kinds_rejected() {
        let dir = minimal_capture("1\n0\n0\n");
        write(dir.path(), "Pre/Enqueue_0001_Kernel_foo_Arg_0_Buffer.bin", &[0; 8]);
        write(dir.path(), "Local0.txt", b"64");
        let err = CaptureReader::new(dir.path()).read().unwrap_err();
        assert!(matches!(err, CaptureError::Malformed { .. }));
    }

    #[test]
    fn test_program_priority() {
        let dir = minimal_capture("1\n0\n0\n");
        write(dir.path(), "kernel.spv", &[0x03, 0x02, 0x23, 0x07]);
        let reader = CaptureReader::new(dir.path());
        assert_eq!(reader.read_program().unwrap().tier(), "source");

        std::fs::remove_file(dir.path().join("kernel.cl")).unwrap();
        assert_eq!(reader.read_program().unwrap().tier(), "il");

        std::fs::remove_file(dir.path().join("kernel.spv")).unwrap();
        assert!(matches!(
            reader.read_program(),
            Err(CaptureError::MissingArtifact { .. })
        ));

        write(dir.path(), "DeviceBinary10.bin", b"ten");
        write(dir.path(), "DeviceBinary2.bin", b"two");
        match reader.read_program().unwrap() {
            ProgramCandidate::Binaries(blobs) => {
                let names: Vec<_> = blobs.iter().map(|b| b.name.as_str()).collect();
                assert_eq!(names, vec!["DeviceBinary2.bin", "DeviceBinary10.bin"]);
            }
            other => panic!("expected binaries, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_positions_rejected() {
        let dir = minimal_capture("1\n0\n0\n");
        write(dir.path(), "Pre/Enqueue_0001_Kernel_foo_Arg_0_Buffer.bin", &[0; 8]);
        write(dir.path(), "Pre/Enqueue_0001_Kernel_foo_Arg_0_Copy.bin", &[0; 8]);
        let err = CaptureReader::new(dir.path()).read().unwrap_err();
        assert!(matches!(err, CaptureError::DuplicateArtifact { position: 0, .. }));
    }
}
