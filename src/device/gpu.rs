//! GPU device backed by wgpu.
//!
//! Context creation requests a high-performance adapter and a single queue.
//! Kernels are compiled twice: first through the shared naga front end (for
//! a readable build log), then into a wgpu compute pipeline inside a
//! validation error scope so driver-side rejections are reported instead of
//! panicking in the default error handler.

use std::sync::mpsc;

use tracing::{debug, info};
use wgpu::util::DeviceExt;

use super::{BufferAccess, Device, DeviceBuffer, KernelArgs, LaunchConfig};
use crate::error::{build_error, device_error, dimension_mismatch, unavailable_error, Result};
use crate::kernel::{
    CompiledKernel, KernelSource, LEFT_BINDING, OUTPUT_BINDING, PARAMS_BINDING, RIGHT_BINDING,
};

const F32_SIZE: u64 = std::mem::size_of::<f32>() as u64;

/// A wgpu storage buffer together with its element count.
#[derive(Debug)]
pub struct GpuBuffer {
    buffer: wgpu::Buffer,
    len: usize,
    access: BufferAccess,
}

impl DeviceBuffer for GpuBuffer {
    fn len(&self) -> usize {
        self.len
    }

    fn access(&self) -> BufferAccess {
        self.access
    }
}

/// A compiled compute pipeline.
#[derive(Debug)]
pub struct GpuKernel {
    compiled: CompiledKernel,
    pipeline: wgpu::ComputePipeline,
}

/// wgpu device, queue and the adapter they came from.
#[derive(Debug)]
pub struct GpuDevice {
    info: wgpu::AdapterInfo,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl GpuDevice {
    /// Creates a device and queue on the first adapter matching `options`.
    fn request(options: &wgpu::RequestAdapterOptions<'_, '_>) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(options))
            .ok_or_else(|| unavailable_error("no compatible GPU adapter found"))?;

        let info = adapter.get_info();
        info!(name = %info.name, backend = ?info.backend, "selected GPU adapter");

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("matmul-offload"),
                ..Default::default()
            },
            None,
        ))
        .map_err(|err| unavailable_error(format!("failed to create GPU device: {err}")))?;

        Ok(Self {
            info,
            device,
            queue,
        })
    }

    /// Runs `f` inside a validation error scope and turns a captured error
    /// into `on_error(message)`.
    fn scoped<T>(
        &self,
        f: impl FnOnce() -> T,
        on_error: impl FnOnce(String) -> crate::error::MatmulError,
    ) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(on_error(err.to_string())),
            None => Ok(value),
        }
    }

    fn byte_size(&self, label: &str, len: usize) -> Result<u64> {
        let bytes = (len as u64)
            .checked_mul(F32_SIZE)
            .ok_or_else(|| device_error(format!("{label}: buffer size overflows")))?;
        let limit = u64::from(self.device.limits().max_storage_buffer_binding_size);
        if bytes > limit {
            return Err(device_error(format!(
                "{label}: {bytes} bytes exceeds the device storage binding limit of {limit} bytes"
            )));
        }
        Ok(bytes)
    }
}

impl Device for GpuDevice {
    type Buffer = GpuBuffer;
    type Kernel = GpuKernel;

    const NAME: &'static str = "gpu";

    fn open() -> Result<Self> {
        Self::request(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            ..Default::default()
        })
    }

    fn description(&self) -> String {
        format!("{} ({:?})", self.info.name, self.info.backend)
    }

    fn compile(&self, source: &KernelSource, entry_point: &str) -> Result<GpuKernel> {
        let compiled = source.compile(entry_point)?;

        let pipeline = self.scoped(
            || {
                let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(source.origin()),
                    source: wgpu::ShaderSource::Wgsl(source.text().into()),
                });
                self.device
                    .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                        label: Some("matrixmul-pipeline"),
                        layout: None,
                        module: &module,
                        entry_point: compiled.entry_point(),
                        compilation_options: Default::default(),
                        cache: None,
                    })
            },
            build_error,
        )?;

        debug!(entry_point, "GPU pipeline created");
        Ok(GpuKernel { compiled, pipeline })
    }

    fn upload(&self, label: &str, data: &[f32]) -> Result<GpuBuffer> {
        self.byte_size(label, data.len())?;
        debug!(label, len = data.len(), "staging input buffer");
        let buffer = self.scoped(
            || {
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(label),
                        contents: bytemuck::cast_slice(data),
                        usage: wgpu::BufferUsages::STORAGE,
                    })
            },
            device_error,
        )?;
        Ok(GpuBuffer {
            buffer,
            len: data.len(),
            access: BufferAccess::ReadOnly,
        })
    }

    fn allocate_output(&self, label: &str, len: usize) -> Result<GpuBuffer> {
        let size = self.byte_size(label, len)?;
        debug!(label, len, "allocating output buffer");
        let buffer = self.scoped(
            || {
                self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(label),
                    size,
                    usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                    mapped_at_creation: false,
                })
            },
            device_error,
        )?;
        Ok(GpuBuffer {
            buffer,
            len,
            access: BufferAccess::WriteOnly,
        })
    }

    fn launch(
        &self,
        kernel: &GpuKernel,
        args: KernelArgs<'_, GpuBuffer>,
        launch: LaunchConfig,
    ) -> Result<()> {
        args.validate()?;
        if launch.local_size() != kernel.compiled.work_group_size() {
            return Err(device_error(format!(
                "invalid work-group size {}: kernel `{}` is compiled for {}",
                launch.local_size(),
                kernel.compiled.entry_point(),
                kernel.compiled.work_group_size()
            )));
        }
        let max_groups = self.device.limits().max_compute_workgroups_per_dimension;
        if launch.work_groups() > max_groups {
            return Err(device_error(format!(
                "{} work-groups exceeds the device limit of {}",
                launch.work_groups(),
                max_groups
            )));
        }

        let dimension = u32::try_from(args.dimension)
            .map_err(|_| device_error("dimension does not fit the kernel parameter"))?;
        let params: [u32; 4] = [dimension, 0, 0, 0];

        debug!(
            global = launch.global_size(),
            local = launch.local_size(),
            work_groups = launch.work_groups(),
            "launching {}",
            kernel.compiled.entry_point()
        );

        self.scoped(
            || {
                let params_buffer =
                    self.device
                        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some("params"),
                            contents: bytemuck::cast_slice(&params),
                            usage: wgpu::BufferUsages::UNIFORM,
                        });

                let layout = kernel.pipeline.get_bind_group_layout(0);
                let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("matrixmul-bind-group"),
                    layout: &layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: PARAMS_BINDING,
                            resource: params_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: OUTPUT_BINDING,
                            resource: args.output.buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: LEFT_BINDING,
                            resource: args.left.buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: RIGHT_BINDING,
                            resource: args.right.buffer.as_entire_binding(),
                        },
                    ],
                });

                let mut encoder = self
                    .device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("matrixmul-encoder"),
                    });
                {
                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("matrixmul-pass"),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(&kernel.pipeline);
                    pass.set_bind_group(0, &bind_group, &[]);
                    pass.dispatch_workgroups(launch.work_groups(), 1, 1);
                }
                self.queue.submit(Some(encoder.finish()));
            },
            device_error,
        )
    }

    fn synchronize(&self) -> Result<()> {
        let _ = self.device.poll(wgpu::Maintain::Wait);
        Ok(())
    }

    fn read_back(&self, buffer: &GpuBuffer, out: &mut [f32]) -> Result<()> {
        if buffer.len != out.len() {
            return Err(dimension_mismatch("read back", buffer.len, out.len()));
        }
        let size = buffer.len as u64 * F32_SIZE;

        let staging = self.scoped(
            || {
                let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("readback"),
                    size,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                let mut encoder = self
                    .device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("readback-encoder"),
                    });
                encoder.copy_buffer_to_buffer(&buffer.buffer, 0, &staging, 0, size);
                self.queue.submit(Some(encoder.finish()));
                staging
            },
            device_error,
        )?;

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|_| device_error("buffer mapping callback was dropped"))?
            .map_err(|err| device_error(format!("failed to map readback buffer: {err}")))?;

        {
            let view = slice.get_mapped_range();
            out.copy_from_slice(bytemuck::cast_slice(&view));
        }
        staging.unmap();
        Ok(())
    }
}
