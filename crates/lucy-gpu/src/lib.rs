//! Lucy GPU: wgpu compute backend for the deconvolution loop.
//!
//! [`GpuBackend`] keeps every plane in a device storage buffer and runs the
//! convolution and element-wise operations as compute shaders. Results agree
//! with `lucy_core::CpuBackend` within floating-point tolerance.

pub mod buffers;
pub mod pipeline;
pub mod readback;

use lucy_core::backend::ComputeBackend;
use lucy_core::convolution::{Boundary, ConvolutionMode};
use lucy_core::error::{DeconvError, Result};
use lucy_core::image::Plane;
use lucy_core::psf::Psf;
use wgpu::util::DeviceExt;

use buffers::{GpuKernel, GpuPlane};
use pipeline::{
    ClampParams, ConvolveParams, CountParams, ElementwiseParams, KernelPipelines, TILE,
    element_grid,
};
use readback::StagingCache;

/// Device features the backend needs. Plain compute only.
pub fn required_features() -> wgpu::Features {
    wgpu::Features::empty()
}

/// [`ComputeBackend`] running on a wgpu device.
///
/// Every operation records and submits its own command buffer; submissions
/// on one queue execute in order, so only downloads and the finiteness
/// check have to wait on the device.
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipelines: KernelPipelines,
    staging: StagingCache,
}

impl GpuBackend {
    /// Build the backend on an existing device and queue.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let pipelines = KernelPipelines::new(&device);
        Self {
            device,
            queue,
            pipelines,
            staging: StagingCache::new(),
        }
    }

    /// Request the default high-performance adapter and build the backend.
    ///
    /// Fails with [`DeconvError::BackendUnavailable`] when no adapter or
    /// device can be obtained.
    pub fn create_blocking() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            ..Default::default()
        }))
        .map_err(|e| DeconvError::BackendUnavailable(format!("no GPU adapter: {e}")))?;

        let info = adapter.get_info();
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("lucy_device"),
            required_features: required_features(),
            required_limits: adapter.limits(),
            ..Default::default()
        }))
        .map_err(|e| DeconvError::BackendUnavailable(format!("device request failed: {e}")))?;

        tracing::info!("GPU backend: {} ({:?})", info.name, info.backend);
        Ok(Self::new(device, queue))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn uniform<T: bytemuck::Pod>(&self, label: &str, value: &T) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::bytes_of(value),
                usage: wgpu::BufferUsages::UNIFORM,
            })
    }

    /// Record one compute pass and submit it.
    fn dispatch(
        &self,
        label: &str,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        groups: (u32, u32),
    ) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(groups.0, groups.1, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn binary(
        &self,
        pipeline: &wgpu::ComputePipeline,
        label: &str,
        lhs: &GpuPlane,
        rhs: &GpuPlane,
        epsilon: f32,
    ) -> Result<GpuPlane> {
        ensure_same_shape(lhs, rhs)?;
        let (width, height) = lhs.dimensions();
        let output = GpuPlane::create_output(&self.device, width, height)?;
        let params = self.uniform(
            "lucy_elementwise_params",
            &ElementwiseParams {
                len: lhs.pixel_count(),
                epsilon,
                _pad: [0; 2],
            },
        );

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lucy_binary_bg"),
            layout: &self.pipelines.binary_layout,
            entries: &[
                buffer_binding(0, &lhs.buffer),
                buffer_binding(1, &rhs.buffer),
                buffer_binding(2, &output.buffer),
                buffer_binding(3, &params),
            ],
        });
        self.dispatch(label, pipeline, &bind_group, element_grid(lhs.pixel_count()));
        Ok(output)
    }
}

impl ComputeBackend for GpuBackend {
    type Tensor = GpuPlane;
    type Kernel = GpuKernel;

    fn name(&self) -> &'static str {
        "gpu"
    }

    fn upload(&self, plane: &Plane) -> Result<GpuPlane> {
        GpuPlane::upload(&self.device, plane)
    }

    fn download(&self, tensor: &GpuPlane) -> Result<Plane> {
        self.staging.download(&self.device, &self.queue, tensor)
    }

    fn upload_kernel(&self, psf: &Psf) -> Result<GpuKernel> {
        Ok(GpuKernel::upload(&self.device, psf))
    }

    fn convolve(
        &self,
        input: &GpuPlane,
        kernel: &GpuKernel,
        mode: ConvolutionMode,
        boundary: Boundary,
    ) -> Result<GpuPlane> {
        let (width, height) = input.dimensions();
        let output = GpuPlane::create_output(&self.device, width, height)?;
        if input.pixel_count() == 0 {
            return Ok(output);
        }

        let params = self.uniform(
            "lucy_convolve_params",
            &ConvolveParams {
                width,
                height,
                kernel_width: kernel.width,
                kernel_height: kernel.height,
                mode: mode.to_u32(),
                boundary: boundary.to_u32(),
                _pad: [0; 2],
            },
        );
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lucy_convolve_bg"),
            layout: &self.pipelines.convolve_layout,
            entries: &[
                buffer_binding(0, &input.buffer),
                buffer_binding(1, &kernel.buffer),
                buffer_binding(2, &output.buffer),
                buffer_binding(3, &params),
            ],
        });
        self.dispatch(
            "lucy_convolve_pass",
            &self.pipelines.convolve,
            &bind_group,
            (width.div_ceil(TILE), height.div_ceil(TILE)),
        );
        Ok(output)
    }

    fn multiply(&self, a: &GpuPlane, b: &GpuPlane) -> Result<GpuPlane> {
        self.binary(&self.pipelines.multiply, "lucy_multiply_pass", a, b, 0.0)
    }

    fn divide_with_floor(
        &self,
        numerator: &GpuPlane,
        denominator: &GpuPlane,
        floor: f32,
    ) -> Result<GpuPlane> {
        self.binary(
            &self.pipelines.divide_with_floor,
            "lucy_divide_pass",
            numerator,
            denominator,
            floor,
        )
    }

    fn clamp(&self, tensor: &mut GpuPlane, low: f32, high: f32) -> Result<()> {
        if low.is_nan() || high.is_nan() || low > high {
            return Err(DeconvError::Backend(format!(
                "invalid clamp range [{low}, {high}]"
            )));
        }
        let params = self.uniform(
            "lucy_clamp_params",
            &ClampParams {
                len: tensor.pixel_count(),
                low,
                high,
                _pad: 0,
            },
        );
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lucy_clamp_bg"),
            layout: &self.pipelines.clamp_layout,
            entries: &[buffer_binding(0, &tensor.buffer), buffer_binding(1, &params)],
        });
        self.dispatch(
            "lucy_clamp_pass",
            &self.pipelines.clamp,
            &bind_group,
            element_grid(tensor.pixel_count()),
        );
        Ok(())
    }

    fn all_finite(&self, tensor: &GpuPlane) -> Result<bool> {
        let counter = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("lucy_non_finite_counter"),
                contents: bytemuck::bytes_of(&0u32),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            });
        let params = self.uniform(
            "lucy_count_params",
            &CountParams {
                len: tensor.pixel_count(),
                _pad: [0; 3],
            },
        );
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lucy_count_bg"),
            layout: &self.pipelines.count_layout,
            entries: &[
                buffer_binding(0, &tensor.buffer),
                buffer_binding(1, &counter),
                buffer_binding(2, &params),
            ],
        });
        self.dispatch(
            "lucy_count_pass",
            &self.pipelines.count_non_finite,
            &bind_group,
            element_grid(tensor.pixel_count()),
        );

        let non_finite = readback::read_u32(&self.device, &self.queue, &counter)?;
        counter.destroy();
        if non_finite > 0 {
            tracing::debug!("{non_finite} non-finite elements");
        }
        Ok(non_finite == 0)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn buffer_binding(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}

fn ensure_same_shape(a: &GpuPlane, b: &GpuPlane) -> Result<()> {
    if a.dimensions() != b.dimensions() {
        return Err(DeconvError::Backend(format!(
            "shape mismatch: {:?} vs {:?}",
            a.dimensions(),
            b.dimensions()
        )));
    }
    Ok(())
}
