//! Run configuration.
//!
//! Defaults reproduce the classic setup: 1024×1024 matrices, work-groups of
//! 64, the bundled WGSL kernel, GPU backend. A TOML file can override any
//! field; command-line flags override the file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::device::BackendKind;
use crate::error::{config_error, Result};
use crate::kernel::{DEFAULT_ENTRY_POINT, DEFAULT_KERNEL_PATH};
use crate::matrix::element_count;

pub const DEFAULT_DIMENSION: usize = 1024;
pub const DEFAULT_WORK_GROUP_SIZE: u32 = 64;
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Matrix dimension `N`; every matrix is `N × N`.
    pub dimension: usize,
    /// Work-group size of the launch; must match the kernel's `@workgroup_size`.
    pub work_group_size: u32,
    /// Seed for the input generator.
    pub seed: u64,
    /// Kernel source file, read at run time.
    pub kernel_path: PathBuf,
    pub entry_point: String,
    pub backend: BackendKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            work_group_size: DEFAULT_WORK_GROUP_SIZE,
            seed: DEFAULT_SEED,
            kernel_path: PathBuf::from(DEFAULT_KERNEL_PATH),
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
            backend: BackendKind::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|err| config_error(err.to_string()))
    }

    /// Reads a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|err| config_error(format!("cannot read {}: {err}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(config_error("dimension must be at least 1"));
        }
        element_count(self.dimension)
            .map_err(|_| config_error(format!("dimension {} is too large", self.dimension)))?;
        if u32::try_from(self.dimension).is_err() {
            return Err(config_error(format!(
                "dimension {} exceeds the launch grid range",
                self.dimension
            )));
        }
        if self.work_group_size == 0 {
            return Err(config_error("work_group_size must be at least 1"));
        }
        if self.entry_point.trim().is_empty() {
            return Err(config_error("entry_point must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_classic_setup() {
        let config = Config::default();
        assert_eq!(config.dimension, 1024);
        assert_eq!(config.work_group_size, 64);
        assert_eq!(config.kernel_path, PathBuf::from("kernels/matrixmul.wgsl"));
        assert_eq!(config.entry_point, "matrixmul");
        assert_eq!(config.backend, BackendKind::Gpu);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str("dimension = 256\nbackend = \"reference\"\n").unwrap();
        assert_eq!(config.dimension, 256);
        assert_eq!(config.backend, BackendKind::Reference);
        assert_eq!(config.work_group_size, DEFAULT_WORK_GROUP_SIZE);
        assert_eq!(config.seed, DEFAULT_SEED);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = Config::from_toml_str("dimensions = 8\n").unwrap_err();
        assert!(format!("{}", err).contains("Configuration error"));
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let config = Config {
            dimension: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            work_group_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_overflowing_dimension() {
        let config = Config {
            dimension: usize::MAX,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
