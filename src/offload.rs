//! Device multiply: compile the kernel, stage buffers, launch, wait, copy back.

use std::io::Write;

use tracing::{debug, warn};

use crate::device::{Device, KernelArgs, LaunchConfig};
use crate::error::{MatmulError, Result};
use crate::kernel::KernelSource;
use crate::matrix::SquareMatrix;

/// How a device multiply ended when it did not fail outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOutcome {
    /// The kernel ran and the output matrix holds its result.
    Completed,
    /// The kernel did not build; the output matrix was not touched.
    BuildFailed {
        /// Compiler build log.
        log: String,
    },
}

impl DeviceOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, DeviceOutcome::Completed)
    }
}

/// The kernel to run and the work-group size to launch it with.
#[derive(Debug, Clone, Copy)]
pub struct KernelInvocation<'a> {
    pub source: &'a KernelSource,
    pub entry_point: &'a str,
    pub work_group_size: u32,
}

impl<'a> KernelInvocation<'a> {
    pub fn new(source: &'a KernelSource, entry_point: &'a str, work_group_size: u32) -> Self {
        Self {
            source,
            entry_point,
            work_group_size,
        }
    }
}

/// Computes `out = left × right` on `device`.
///
/// The right and left operands are staged as read-only buffers, the output
/// as a write-only buffer of `n²` elements, and the kernel is launched over
/// `n` work items in groups of `kernel.work_group_size`. The call blocks
/// until the device has finished and the result has been copied into `out`.
///
/// A kernel build failure is written to `report` and returned as
/// [`DeviceOutcome::BuildFailed`]; every other failure is an error.
pub fn device_matmul<D: Device, W: Write>(
    device: &D,
    kernel: KernelInvocation<'_>,
    left: &SquareMatrix,
    right: &SquareMatrix,
    out: &mut SquareMatrix,
    report: &mut W,
) -> Result<DeviceOutcome> {
    left.check_same_dimension(right, "right operand")?;
    left.check_same_dimension(out, "output matrix")?;

    let n = left.dimension();
    let launch = LaunchConfig::for_rows(n, kernel.work_group_size)?;

    let compiled = match device.compile(kernel.source, kernel.entry_point) {
        Ok(compiled) => compiled,
        Err(MatmulError::KernelBuild { log }) => {
            warn!(origin = kernel.source.origin(), "kernel build failed");
            writeln!(report, "Error compiling Kernel code: {log}")?;
            return Ok(DeviceOutcome::BuildFailed { log });
        }
        Err(err) => return Err(err),
    };

    let mut d_a = device.allocate_output("d_A", out.len())?;
    let d_c = device.upload("d_C", right.as_slice())?;
    let d_b = device.upload("d_B", left.as_slice())?;

    writeln!(report, "Launching Kernel!")?;
    device.launch(
        &compiled,
        KernelArgs {
            dimension: n,
            output: &mut d_a,
            left: &d_b,
            right: &d_c,
        },
        launch,
    )?;

    device.synchronize()?;
    device.read_back(&d_a, out.as_mut_slice())?;
    debug!(dimension = n, "device multiply complete");

    Ok(DeviceOutcome::Completed)
}
