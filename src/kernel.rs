//! Kernel source loading and front-end compilation.
//!
//! The kernel is WGSL loaded from disk at runtime. Compiling it here runs
//! the naga front end and validator, so a malformed kernel produces a real
//! build log regardless of which device will execute it. The compiled form
//! also records the interface the offload path relies on:
//!
//! ```text
//! @group(0) @binding(0) var<uniform> params            // params.x == N
//! @group(0) @binding(1) var<storage, read_write> out_a // A, N*N
//! @group(0) @binding(2) var<storage, read> lhs          // B, N*N
//! @group(0) @binding(3) var<storage, read> rhs          // C, N*N
//! @compute @workgroup_size(64) fn matrixmul(...)       // one row per item
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::{AddressSpace, ShaderStage, StorageAccess};
use tracing::{debug, warn};

use crate::error::{build_error, MatmulError, Result};

/// Default location of the kernel, relative to the working directory.
pub const DEFAULT_KERNEL_PATH: &str = "kernels/matrixmul.wgsl";

/// Default kernel entry point.
pub const DEFAULT_ENTRY_POINT: &str = "matrixmul";

pub const PARAMS_BINDING: u32 = 0;
pub const OUTPUT_BINDING: u32 = 1;
pub const LEFT_BINDING: u32 = 2;
pub const RIGHT_BINDING: u32 = 3;

/// WGSL kernel text plus where it came from.
#[derive(Debug, Clone)]
pub struct KernelSource {
    origin: String,
    text: String,
}

impl KernelSource {
    /// Reads the kernel from `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| MatmulError::KernelSource {
            path: PathBuf::from(path),
            source,
        })?;
        debug!(path = %path.display(), bytes = text.len(), "loaded kernel source");
        Ok(Self {
            origin: path.display().to_string(),
            text,
        })
    }

    /// Wraps kernel text that did not come from a file.
    pub fn inline(origin: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            text: text.into(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Parses and validates the source, then checks the entry point and
    /// binding layout. Every failure is a `KernelBuild` error whose log is
    /// the rendered diagnostic.
    pub fn compile(&self, entry_point: &str) -> Result<CompiledKernel> {
        let module = naga::front::wgsl::parse_str(&self.text)
            .map_err(|err| build_error(err.emit_to_string(&self.text)))?;

        Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .map_err(|err| build_error(format!("{}: {}", self.origin, err.as_inner())))?;

        let entry = module
            .entry_points
            .iter()
            .find(|ep| ep.name == entry_point)
            .ok_or_else(|| {
                build_error(format!(
                    "{}: no entry point named `{}`",
                    self.origin, entry_point
                ))
            })?;

        if entry.stage != ShaderStage::Compute {
            return Err(build_error(format!(
                "{}: entry point `{}` is not a compute shader",
                self.origin, entry_point
            )));
        }

        let [x, y, z] = entry.workgroup_size;
        if y != 1 || z != 1 {
            return Err(build_error(format!(
                "{}: entry point `{}` must use a 1-D work-group, found ({}, {}, {})",
                self.origin, entry_point, x, y, z
            )));
        }

        self.check_bindings(&module)?;

        debug!(origin = %self.origin, entry_point, work_group_size = x, "kernel compiled");
        Ok(CompiledKernel {
            entry_point: entry_point.to_string(),
            work_group_size: x,
        })
    }

    fn check_bindings(&self, module: &naga::Module) -> Result<()> {
        let mut seen = [false; 4];

        for (_, var) in module.global_variables.iter() {
            let Some(binding) = &var.binding else {
                continue;
            };
            if binding.group != 0 {
                warn!(group = binding.group, "kernel declares bindings outside group 0");
                continue;
            }
            let name = var.name.as_deref().unwrap_or("<unnamed>");
            let ok = match (binding.binding, var.space) {
                (PARAMS_BINDING, AddressSpace::Uniform) => true,
                (OUTPUT_BINDING, AddressSpace::Storage { access }) => {
                    access.contains(StorageAccess::STORE)
                }
                (LEFT_BINDING | RIGHT_BINDING, AddressSpace::Storage { access }) => {
                    !access.contains(StorageAccess::STORE)
                }
                (other, _) if other as usize >= seen.len() => {
                    return Err(build_error(format!(
                        "{}: unexpected binding {} (`{}`)",
                        self.origin, other, name
                    )))
                }
                _ => false,
            };
            if !ok {
                return Err(build_error(format!(
                    "{}: binding {} (`{}`) has the wrong address space or access mode",
                    self.origin, binding.binding, name
                )));
            }
            seen[binding.binding as usize] = true;
        }

        if let Some(missing) = seen.iter().position(|present| !present) {
            return Err(build_error(format!(
                "{}: kernel does not declare binding {}",
                self.origin, missing
            )));
        }
        Ok(())
    }
}

/// A kernel that passed front-end compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledKernel {
    entry_point: String,
    work_group_size: u32,
}

impl CompiledKernel {
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Work-group size declared by `@workgroup_size`.
    pub fn work_group_size(&self) -> u32 {
        self.work_group_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = include_str!("../kernels/matrixmul.wgsl");

    #[test]
    fn test_bundled_kernel_compiles() {
        let kernel = KernelSource::inline("bundled", GOOD)
            .compile(DEFAULT_ENTRY_POINT)
            .unwrap();
        assert_eq!(kernel.entry_point(), "matrixmul");
        assert_eq!(kernel.work_group_size(), 64);
    }

    #[test]
    fn test_syntax_error_yields_build_log() {
        let broken = GOOD.replacen("let n = params.x;", "let n = params.x", 1);
        let err = KernelSource::inline("broken", broken)
            .compile(DEFAULT_ENTRY_POINT)
            .unwrap_err();
        assert!(err.is_build_failure());
        match err {
            MatmulError::KernelBuild { log } => assert!(!log.is_empty()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_entry_point() {
        let err = KernelSource::inline("bundled", GOOD)
            .compile("not_there")
            .unwrap_err();
        assert!(format!("{}", err).contains("no entry point named `not_there`"));
    }

    #[test]
    fn test_wrong_access_mode_rejected() {
        let wrong = GOOD.replacen(
            "var<storage, read> lhs: array<f32>;",
            "var<storage, read_write> lhs: array<f32>;",
            1,
        );
        let err = KernelSource::inline("wrong", wrong)
            .compile(DEFAULT_ENTRY_POINT)
            .unwrap_err();
        assert!(err.is_build_failure());
        assert!(format!("{}", err).contains("binding 2"));
    }

    #[test]
    fn test_missing_file_is_source_error() {
        let err = KernelSource::from_path("kernels/does-not-exist.wgsl").unwrap_err();
        assert!(matches!(err, MatmulError::KernelSource { .. }));
    }
}
