//! Compute device abstraction.
//!
//! The offload path only needs five capabilities from a device: compile a
//! kernel from source, allocate/stage buffers, enqueue a launch, wait for it,
//! and copy the result back. [`Device`] captures exactly that so the
//! benchmark driver is the same for the GPU and the CPU reference device.

use std::fmt;

use clap::ValueEnum;
use serde::Deserialize;

use crate::error::{dimension_mismatch, validation_error, Result};
use crate::kernel::KernelSource;
use crate::matrix::element_count;

#[cfg(feature = "gpu")]
pub mod gpu;
pub mod reference;

/// Which device implementation a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// GPU through wgpu.
    #[default]
    Gpu,
    /// CPU reference device; work-groups run as rayon tasks.
    Reference,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Gpu => write!(f, "gpu"),
            BackendKind::Reference => write!(f, "reference"),
        }
    }
}

/// How a buffer may be used by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAccess {
    /// Staged from host memory, only read by the kernel.
    ReadOnly,
    /// Written by the kernel, copied back afterwards.
    WriteOnly,
}

/// Common view of device buffers, used to validate launches.
pub trait DeviceBuffer {
    /// Number of `f32` elements.
    fn len(&self) -> usize;

    fn access(&self) -> BufferAccess;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 1-D launch geometry: `global_size` work items in groups of `local_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    global_size: u32,
    local_size: u32,
}

impl LaunchConfig {
    pub fn new(global_size: u32, local_size: u32) -> Result<Self> {
        if global_size == 0 {
            return Err(validation_error("launch global size must be non-zero"));
        }
        if local_size == 0 {
            return Err(validation_error("launch work-group size must be non-zero"));
        }
        Ok(Self {
            global_size,
            local_size,
        })
    }

    /// One work item per matrix row.
    pub fn for_rows(dimension: usize, local_size: u32) -> Result<Self> {
        let global = u32::try_from(dimension).map_err(|_| {
            validation_error(format!("dimension {dimension} exceeds the launch grid range"))
        })?;
        Self::new(global, local_size)
    }

    pub fn global_size(&self) -> u32 {
        self.global_size
    }

    pub fn local_size(&self) -> u32 {
        self.local_size
    }

    /// Number of work-groups dispatched; the last one may be partial.
    pub fn work_groups(&self) -> u32 {
        self.global_size.div_ceil(self.local_size)
    }
}

/// Arguments of the matrix multiply kernel, in kernel order.
#[derive(Debug)]
pub struct KernelArgs<'a, B> {
    pub dimension: usize,
    pub output: &'a mut B,
    pub left: &'a B,
    pub right: &'a B,
}

impl<B: DeviceBuffer> KernelArgs<'_, B> {
    /// Every buffer must hold exactly `dimension²` elements, inputs must be
    /// read-only and the output write-only.
    pub fn validate(&self) -> Result<()> {
        let expected = element_count(self.dimension)?;
        let buffers: [(&str, &B, BufferAccess); 3] = [
            ("output buffer", &*self.output, BufferAccess::WriteOnly),
            ("left operand buffer", self.left, BufferAccess::ReadOnly),
            ("right operand buffer", self.right, BufferAccess::ReadOnly),
        ];
        for (context, buffer, access) in buffers {
            if buffer.len() != expected {
                return Err(dimension_mismatch(context, expected, buffer.len()));
            }
            if buffer.access() != access {
                return Err(validation_error(format!(
                    "{context} must be {access:?}, found {:?}",
                    buffer.access()
                )));
            }
        }
        Ok(())
    }
}

/// A compute device able to run the matrix multiply kernel.
///
/// Implementations own their context and queue; every resource they hand
/// out lives no longer than the device itself.
pub trait Device: Sized {
    type Buffer: DeviceBuffer;
    type Kernel;

    /// Short backend name used in progress output.
    const NAME: &'static str;

    /// Creates the device context and command queue.
    fn open() -> Result<Self>;

    /// Human-readable description of the underlying hardware.
    fn description(&self) -> String;

    /// Builds `entry_point` from `source`. Build failures are reported as
    /// [`crate::error::MatmulError::KernelBuild`].
    fn compile(&self, source: &KernelSource, entry_point: &str) -> Result<Self::Kernel>;

    /// Stages `data` into a new read-only buffer.
    fn upload(&self, label: &str, data: &[f32]) -> Result<Self::Buffer>;

    /// Allocates a write-only buffer of `len` elements.
    fn allocate_output(&self, label: &str, len: usize) -> Result<Self::Buffer>;

    /// Enqueues one launch of `kernel`.
    fn launch(
        &self,
        kernel: &Self::Kernel,
        args: KernelArgs<'_, Self::Buffer>,
        launch: LaunchConfig,
    ) -> Result<()>;

    /// Blocks until all enqueued work has completed.
    fn synchronize(&self) -> Result<()>;

    /// Copies `buffer` into `out`; lengths must match.
    fn read_back(&self, buffer: &Self::Buffer, out: &mut [f32]) -> Result<()>;
}
