//! Host loop vs reference device across matrix sizes.
//!
//! # Usage:
//! ```bash
//! cargo bench --bench matmul
//! cargo bench --bench matmul -- matmul_128
//! ```

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use rand::prelude::*;

use matmul_offload::device::reference::ReferenceDevice;
use matmul_offload::device::Device;
use matmul_offload::host::host_matmul;
use matmul_offload::kernel::KernelSource;
use matmul_offload::offload::{device_matmul, KernelInvocation};
use matmul_offload::SquareMatrix;

const KERNEL: &str = include_str!("../kernels/matrixmul.wgsl");

fn bench_matmul_by_size(c: &mut Criterion) {
    let sizes = [64, 128, 256];
    let source = KernelSource::inline("matrixmul.wgsl", KERNEL);
    let device = ReferenceDevice::open().expect("reference device");

    for n in sizes {
        let mut group = c.benchmark_group(format!("matmul_{n}"));
        group.sample_size(20);
        group.throughput(Throughput::Elements((2 * n * n * n) as u64));

        let mut rng = StdRng::seed_from_u64(42);
        let b = SquareMatrix::random(n, &mut rng).unwrap();
        let cm = SquareMatrix::random(n, &mut rng).unwrap();
        let mut out = SquareMatrix::zeros(n).unwrap();

        group.bench_function("host", |bench| {
            bench.iter(|| {
                host_matmul(black_box(&b), black_box(&cm), &mut out).unwrap();
                black_box(&out);
            });
        });

        group.bench_function("reference_device", |bench| {
            bench.iter(|| {
                device_matmul(
                    &device,
                    KernelInvocation::new(&source, "matrixmul", 64),
                    black_box(&b),
                    black_box(&cm),
                    &mut out,
                    &mut std::io::sink(),
                )
                .unwrap();
                black_box(&out);
            });
        });

        group.finish();
    }
}

criterion_group!(benches, bench_matmul_by_size);
criterion_main!(benches);
