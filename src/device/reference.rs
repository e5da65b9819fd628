//! CPU reference device.
//!
//! Compiles kernels with the same WGSL front end as the GPU path, so build
//! logs, entry points, bindings and the work-group size are checked against
//! the real source. The kernel body is not interpreted: `launch` executes the
//! row-per-work-item matrix multiply contract natively, one rayon task per
//! work-group. A kernel that compiles but computes the wrong thing still
//! produces the correct product here; only the GPU device runs the WGSL.
//!
//! It stands in for a GPU on machines without one and in tests.

use rayon::{
    iter::{IndexedParallelIterator, ParallelIterator},
    slice::ParallelSliceMut,
};
use tracing::debug;

use super::{BufferAccess, Device, DeviceBuffer, KernelArgs, LaunchConfig};
use crate::error::{device_error, dimension_mismatch, Result};
use crate::kernel::{CompiledKernel, KernelSource};
use crate::matrix::at;

/// Host-memory buffer owned by the reference device.
#[derive(Debug, Clone)]
pub struct HostBuffer {
    label: String,
    access: BufferAccess,
    data: Vec<f32>,
}

impl DeviceBuffer for HostBuffer {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn access(&self) -> BufferAccess {
        self.access
    }
}

/// CPU device backed by the global rayon pool.
#[derive(Debug)]
pub struct ReferenceDevice {
    threads: usize,
}

impl Device for ReferenceDevice {
    type Buffer = HostBuffer;
    type Kernel = CompiledKernel;

    const NAME: &'static str = "reference";

    fn open() -> Result<Self> {
        let threads = rayon::current_num_threads();
        debug!(threads, "opened reference device");
        Ok(Self { threads })
    }

    fn description(&self) -> String {
        format!("CPU reference device ({} threads)", self.threads)
    }

    fn compile(&self, source: &KernelSource, entry_point: &str) -> Result<CompiledKernel> {
        source.compile(entry_point)
    }

    fn upload(&self, label: &str, data: &[f32]) -> Result<HostBuffer> {
        debug!(label, len = data.len(), "staging input buffer");
        Ok(HostBuffer {
            label: label.to_string(),
            access: BufferAccess::ReadOnly,
            data: data.to_vec(),
        })
    }

    fn allocate_output(&self, label: &str, len: usize) -> Result<HostBuffer> {
        debug!(label, len, "allocating output buffer");
        Ok(HostBuffer {
            label: label.to_string(),
            access: BufferAccess::WriteOnly,
            data: vec![0.0; len],
        })
    }

    fn launch(
        &self,
        kernel: &CompiledKernel,
        args: KernelArgs<'_, HostBuffer>,
        launch: LaunchConfig,
    ) -> Result<()> {
        args.validate()?;
        if launch.local_size() != kernel.work_group_size() {
            return Err(device_error(format!(
                "invalid work-group size {}: kernel `{}` is compiled for {}",
                launch.local_size(),
                kernel.entry_point(),
                kernel.work_group_size()
            )));
        }

        let n = args.dimension;
        let local = launch.local_size() as usize;
        let global = launch.global_size() as usize;
        let left = args.left.data.as_slice();
        let right = args.right.data.as_slice();

        debug!(
            global,
            local,
            work_groups = launch.work_groups(),
            "launching {}",
            kernel.entry_point()
        );

        // Each chunk is the slice of output rows owned by one work-group.
        args.output
            .data
            .par_chunks_mut(n * local)
            .enumerate()
            .for_each(|(group, rows)| {
                for (local_id, row) in rows.chunks_mut(n).enumerate() {
                    let i = group * local + local_id;
                    if i >= global {
                        return;
                    }
                    for (j, slot) in row.iter_mut().enumerate() {
                        let mut acc = 0.0f32;
                        for k in 0..n {
                            acc += left[at(i, k, n)] * right[at(k, j, n)];
                        }
                        *slot = acc;
                    }
                }
            });

        Ok(())
    }

    fn synchronize(&self) -> Result<()> {
        // Launches run to completion before `launch` returns.
        Ok(())
    }

    fn read_back(&self, buffer: &HostBuffer, out: &mut [f32]) -> Result<()> {
        if buffer.data.len() != out.len() {
            return Err(dimension_mismatch(
                format!("read back of {}", buffer.label),
                buffer.data.len(),
                out.len(),
            ));
        }
        out.copy_from_slice(&buffer.data);
        Ok(())
    }
}
