//! Error types for matmul-offload operations.
//!
//! Two classes matter to the driver: a kernel build failure, which is
//! reported and survived, and everything else on the device side, which
//! ends the process with a non-zero exit code.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Exit code for configuration and usage errors.
pub const EXIT_CONFIG: u8 = 2;
/// Exit code when no usable compute device could be opened.
pub const EXIT_DEVICE_UNAVAILABLE: u8 = 3;
/// Exit code for any other device/runtime failure (`-1` as a process status).
pub const EXIT_DEVICE_ERROR: u8 = 255;

/// Errors that can occur while benchmarking host and device multiplies.
#[derive(Debug, Error)]
pub enum MatmulError {
    /// Input validation error.
    #[error("Validation error: {message}")]
    Validation {
        /// Human-readable error message.
        message: String,
    },
    /// A matrix or buffer does not hold `dimension²` elements.
    #[error("Dimension mismatch in {context}: expected {expected} elements, got {actual}")]
    DimensionMismatch {
        /// Which operand or buffer was wrong.
        context: String,
        /// Element count required by the problem dimension.
        expected: usize,
        /// Element count actually supplied.
        actual: usize,
    },
    /// Invalid run configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },
    /// The kernel source file could not be read.
    #[error("Failed to read kernel source {}: {source}", path.display())]
    KernelSource {
        /// Path that was tried.
        path: PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },
    /// The kernel failed to compile; `log` is the compiler's build log.
    #[error("Error compiling Kernel code: {log}")]
    KernelBuild {
        /// Rendered build log.
        log: String,
    },
    /// No usable compute device.
    #[error("Compute device unavailable: {message}")]
    DeviceUnavailable {
        /// Human-readable error message.
        message: String,
    },
    /// Any other device or runtime failure.
    #[error("Device error: {message}")]
    Device {
        /// Human-readable error message.
        message: String,
    },
    /// Writing the progress report failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl MatmulError {
    /// True for the recoverable class: the kernel did not build.
    pub fn is_build_failure(&self) -> bool {
        matches!(self, MatmulError::KernelBuild { .. })
    }

    /// Process exit code for this error when it reaches `main`.
    pub fn exit_code(&self) -> u8 {
        match self {
            MatmulError::Validation { .. } | MatmulError::Config { .. } => EXIT_CONFIG,
            MatmulError::DeviceUnavailable { .. } => EXIT_DEVICE_UNAVAILABLE,
            MatmulError::DimensionMismatch { .. }
            | MatmulError::KernelSource { .. }
            | MatmulError::KernelBuild { .. }
            | MatmulError::Device { .. }
            | MatmulError::Io(_) => EXIT_DEVICE_ERROR,
        }
    }
}

/// Result type alias for matmul-offload operations.
pub type Result<T> = std::result::Result<T, MatmulError>;

/// Creates a validation error.
pub fn validation_error(message: impl Into<String>) -> MatmulError {
    MatmulError::Validation {
        message: message.into(),
    }
}

/// Creates a dimension mismatch error.
pub fn dimension_mismatch(context: impl Into<String>, expected: usize, actual: usize) -> MatmulError {
    MatmulError::DimensionMismatch {
        context: context.into(),
        expected,
        actual,
    }
}

/// Creates a configuration error.
pub fn config_error(message: impl Into<String>) -> MatmulError {
    MatmulError::Config {
        message: message.into(),
    }
}

/// Creates a kernel build error carrying the build log.
pub fn build_error(log: impl Into<String>) -> MatmulError {
    MatmulError::KernelBuild { log: log.into() }
}

/// Creates a device-unavailable error.
pub fn unavailable_error(message: impl Into<String>) -> MatmulError {
    MatmulError::DeviceUnavailable {
        message: message.into(),
    }
}

/// Creates a generic device error.
pub fn device_error(message: impl Into<String>) -> MatmulError {
    MatmulError::Device {
        message: message.into(),
    }
}
