//! Benchmark driver: generate inputs, time the host multiply, time the
//! device multiply, print both.
//!
//! The device section is timed from before the context is created until
//! the result has been copied back, so it includes setup, kernel build and
//! transfers, not only kernel execution.

use std::io::Write;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::config::Config;
use crate::device::{reference::ReferenceDevice, BackendKind, Device};
use crate::error::Result;
use crate::host::host_matmul;
use crate::kernel::KernelSource;
use crate::matrix::{element_count, SquareMatrix, RANDOM_VALUE_BOUND};
use crate::offload::{device_matmul, DeviceOutcome, KernelInvocation};

/// What one benchmark run produced.
#[derive(Debug, Clone)]
pub struct BenchmarkReport {
    pub dimension: usize,
    pub backend: &'static str,
    pub host_seconds: f64,
    pub device_seconds: f64,
    pub host_result: SquareMatrix,
    /// Device result; `None` when the kernel did not build.
    pub device_result: Option<SquareMatrix>,
    pub device_outcome: DeviceOutcome,
}

/// Generates the inputs `(B, C)`, drawing `B[i]` then `C[i]` for each index.
pub fn generate_inputs(dimension: usize, seed: u64) -> Result<(SquareMatrix, SquareMatrix)> {
    let len = element_count(dimension)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut b = Vec::with_capacity(len);
    let mut c = Vec::with_capacity(len);
    for _ in 0..len {
        b.push(rng.random_range(0..RANDOM_VALUE_BOUND) as f32);
        c.push(rng.random_range(0..RANDOM_VALUE_BOUND) as f32);
    }
    Ok((
        SquareMatrix::from_vec(dimension, b)?,
        SquareMatrix::from_vec(dimension, c)?,
    ))
}

/// Runs the benchmark on device `D`, writing progress lines to `report`.
pub fn run<D: Device, W: Write>(config: &Config, report: &mut W) -> Result<BenchmarkReport> {
    config.validate()?;
    writeln!(report, "Starting...")?;

    let n = config.dimension;
    let (b, c) = generate_inputs(n, config.seed)?;
    let mut a = SquareMatrix::zeros(n)?;

    let timer = Instant::now();
    writeln!(report, "Performing matrix multiply on the host...")?;
    host_matmul(&b, &c, &mut a)?;
    let host_seconds = timer.elapsed().as_secs_f64();
    writeln!(report, "Host computation complete in {host_seconds:.6} seconds")?;
    info!(dimension = n, seconds = host_seconds, "host multiply finished");
    let host_result = a.clone();

    let timer = Instant::now();
    writeln!(report, "Performing matrix multiply on the device {}...", D::NAME)?;
    let device = D::open()?;
    info!(device = %device.description(), "device context created");
    let source = KernelSource::from_path(&config.kernel_path)?;
    let device_outcome = device_matmul(
        &device,
        KernelInvocation::new(&source, &config.entry_point, config.work_group_size),
        &b,
        &c,
        &mut a,
        report,
    )?;
    let device_seconds = timer.elapsed().as_secs_f64();
    writeln!(report, "The Kernels finished in {device_seconds:.6} seconds")?;
    info!(dimension = n, seconds = device_seconds, "device multiply finished");

    writeln!(report, "Success!")?;

    let device_result = device_outcome.is_completed().then_some(a);
    Ok(BenchmarkReport {
        dimension: n,
        backend: D::NAME,
        host_seconds,
        device_seconds,
        host_result,
        device_result,
        device_outcome,
    })
}

/// Runs the benchmark on the backend named by `config.backend`.
pub fn run_configured<W: Write>(config: &Config, report: &mut W) -> Result<BenchmarkReport> {
    match config.backend {
        BackendKind::Gpu => run_gpu(config, report),
        BackendKind::Reference => run::<ReferenceDevice, W>(config, report),
    }
}

#[cfg(feature = "gpu")]
fn run_gpu<W: Write>(config: &Config, report: &mut W) -> Result<BenchmarkReport> {
    run::<crate::device::gpu::GpuDevice, W>(config, report)
}

#[cfg(not(feature = "gpu"))]
fn run_gpu<W: Write>(config: &Config, _report: &mut W) -> Result<BenchmarkReport> {
    config.validate()?;
    Err(crate::error::unavailable_error(
        "this build does not include GPU support (enable the `gpu` feature)",
    ))
}
