use std::path::PathBuf;

use matmul_offload::benchmark::{generate_inputs, run, run_configured};
use matmul_offload::device::reference::ReferenceDevice;
use matmul_offload::device::Device;
use matmul_offload::error::EXIT_DEVICE_ERROR;
use matmul_offload::host::host_matmul;
use matmul_offload::kernel::KernelSource;
use matmul_offload::offload::{device_matmul, KernelInvocation};
use matmul_offload::{BackendKind, Config, DeviceOutcome, SquareMatrix};
use ndarray::Array2;

fn kernel_path() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/kernels/matrixmul.wgsl"))
}

fn reference_config(dimension: usize, seed: u64) -> Config {
    Config {
        dimension,
        seed,
        kernel_path: kernel_path(),
        backend: BackendKind::Reference,
        ..Config::default()
    }
}

fn oracle(left: &SquareMatrix, right: &SquareMatrix) -> Vec<f32> {
    let n = left.dimension();
    let l = Array2::from_shape_vec((n, n), left.as_slice().to_vec()).unwrap();
    let r = Array2::from_shape_vec((n, n), right.as_slice().to_vec()).unwrap();
    l.dot(&r).iter().copied().collect()
}

fn both_paths(left: &SquareMatrix, right: &SquareMatrix) -> (SquareMatrix, SquareMatrix) {
    let n = left.dimension();
    let mut host = SquareMatrix::zeros(n).unwrap();
    host_matmul(left, right, &mut host).unwrap();

    let device = ReferenceDevice::open().unwrap();
    let source = KernelSource::from_path(kernel_path()).unwrap();
    let mut dev = SquareMatrix::zeros(n).unwrap();
    let outcome = device_matmul(
        &device,
        KernelInvocation::new(&source, "matrixmul", 64),
        left,
        right,
        &mut dev,
        &mut std::io::sink(),
    )
    .unwrap();
    assert_eq!(outcome, DeviceOutcome::Completed);
    (host, dev)
}

#[test]
fn test_known_2x2_product_on_host_and_device() {
    let b = SquareMatrix::from_vec(2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
    let c = SquareMatrix::from_vec(2, vec![5.0, 6.0, 7.0, 8.0]).unwrap();

    let (host, dev) = both_paths(&b, &c);

    assert_eq!(host.as_slice(), &[19.0, 22.0, 43.0, 50.0]);
    assert_eq!(dev.as_slice(), &[19.0, 22.0, 43.0, 50.0]);
}

#[test]
fn test_known_4x4_product_on_host_and_device() {
    // B = [[1..4], [5..8], [9..12], [13..16]], C = 2 * I + ones
    let b = SquareMatrix::from_vec(4, (1..=16).map(|x| x as f32).collect()).unwrap();
    let mut c = SquareMatrix::from_vec(4, vec![1.0; 16]).unwrap();
    for i in 0..4 {
        c[(i, i)] = 3.0;
    }
    // Row r of B·C is 2 * B[r] + sum(B[r]) in every column.
    let mut expected = Vec::new();
    for r in 0..4 {
        let row = b.row(r);
        let sum: f32 = row.iter().sum();
        expected.extend(row.iter().map(|v| 2.0 * v + sum));
    }

    let (host, dev) = both_paths(&b, &c);

    assert_eq!(host.as_slice(), expected.as_slice());
    assert_eq!(dev.as_slice(), expected.as_slice());
}

#[test]
fn test_random_inputs_agree_with_oracle() {
    let (b, c) = generate_inputs(96, 2024).unwrap();
    let expected = oracle(&b, &c);

    let (host, dev) = both_paths(&b, &c);

    for (i, ((h, d), e)) in host
        .as_slice()
        .iter()
        .zip(dev.as_slice())
        .zip(expected.iter())
        .enumerate()
    {
        let tolerance = 1e-4 * e.abs().max(1.0);
        assert!((h - e).abs() <= tolerance, "host A[{}]: {} != {}", i, h, e);
        assert!((d - e).abs() <= tolerance, "device A[{}]: {} != {}", i, d, e);
    }
}

#[test]
fn test_driver_report_lines_in_order() {
    let config = reference_config(16, 1);
    let mut out = Vec::new();

    let report = run_configured(&config, &mut out).unwrap();

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 7, "unexpected report:\n{}", text);
    assert_eq!(lines[0], "Starting...");
    assert_eq!(lines[1], "Performing matrix multiply on the host...");
    assert!(lines[2].starts_with("Host computation complete in "));
    assert!(lines[2].ends_with(" seconds"));
    assert_eq!(lines[3], "Performing matrix multiply on the device reference...");
    assert_eq!(lines[4], "Launching Kernel!");
    assert!(lines[5].starts_with("The Kernels finished in "));
    assert_eq!(lines[6], "Success!");

    assert_eq!(report.dimension, 16);
    assert_eq!(report.backend, "reference");
    assert_eq!(report.device_outcome, DeviceOutcome::Completed);
    assert_eq!(report.device_result.as_ref(), Some(&report.host_result));
}

#[test]
fn test_fixed_seed_is_reproducible() {
    let first = run::<ReferenceDevice, _>(&reference_config(24, 9), &mut std::io::sink()).unwrap();
    let second = run::<ReferenceDevice, _>(&reference_config(24, 9), &mut std::io::sink()).unwrap();
    let other = run::<ReferenceDevice, _>(&reference_config(24, 10), &mut std::io::sink()).unwrap();

    assert_eq!(first.host_result, second.host_result);
    assert_eq!(first.device_result, second.device_result);
    assert_ne!(first.host_result, other.host_result);
}

#[test]
fn test_dimension_not_a_multiple_of_work_group() {
    let config = reference_config(100, 5);
    let report = run_configured(&config, &mut std::io::sink()).unwrap();
    assert_eq!(report.device_result.as_ref(), Some(&report.host_result));
}

#[test]
fn test_foreign_work_group_size_is_a_device_error() {
    let config = Config {
        work_group_size: 32,
        ..reference_config(8, 1)
    };
    let mut out = Vec::new();

    let err = run_configured(&config, &mut out).unwrap_err();

    assert_eq!(err.exit_code(), EXIT_DEVICE_ERROR);
    let text = String::from_utf8(out).unwrap();
    assert!(!text.contains("Success!"));
}
