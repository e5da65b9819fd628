//! Dense square matrix multiply `A = B × C`, timed on the host and on a
//! compute device.
//!
//! The host path is a plain triple loop. The device path compiles a WGSL
//! kernel, stages the operands, launches one work item per output row and
//! copies the result back. Devices implement [`device::Device`], so the
//! benchmark driver runs unchanged on a GPU (wgpu) or on the CPU reference
//! device.

pub mod benchmark;
pub mod config;
pub mod device;
pub mod error;
pub mod host;
pub mod kernel;
pub mod matrix;
pub mod offload;

pub use config::Config;
pub use device::{BackendKind, Device, LaunchConfig};
pub use error::{MatmulError, Result};
pub use matrix::SquareMatrix;
pub use offload::{DeviceOutcome, KernelInvocation};
