//! Compute pipelines for the deconvolution kernels and their uniform layouts.

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};

/// Threads per workgroup for the 1D element passes.
pub const ELEMENT_WORKGROUP: u32 = 256;
/// Workgroup edge for the 2D convolution pass.
pub const TILE: u32 = 16;
/// Per-dimension dispatch limit guaranteed by wgpu's default limits.
const MAX_GROUPS_PER_DIM: u32 = 65_535;

/// Uniform for `convolve.wgsl`. Must match `ConvolveParams` there.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ConvolveParams {
    pub width: u32,
    pub height: u32,
    pub kernel_width: u32,
    pub kernel_height: u32,
    pub mode: u32,
    pub boundary: u32,
    pub _pad: [u32; 2],
}

/// Uniform for `elementwise.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ElementwiseParams {
    pub len: u32,
    pub epsilon: f32,
    pub _pad: [u32; 2],
}

/// Uniform for `clamp.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ClampParams {
    pub len: u32,
    pub low: f32,
    pub high: f32,
    pub _pad: u32,
}

/// Uniform for `finite.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CountParams {
    pub len: u32,
    pub _pad: [u32; 3],
}

/// Workgroup grid covering `len` elements with [`ELEMENT_WORKGROUP`]-wide groups.
///
/// Wraps into a second dimension once the first would exceed the device limit.
pub fn element_grid(len: u32) -> (u32, u32) {
    let groups = len.div_ceil(ELEMENT_WORKGROUP).max(1);
    if groups <= MAX_GROUPS_PER_DIM {
        (groups, 1)
    } else {
        (MAX_GROUPS_PER_DIM, groups.div_ceil(MAX_GROUPS_PER_DIM))
    }
}

/// All compiled pipelines with the bind group layouts they were built for.
pub struct KernelPipelines {
    pub convolve: wgpu::ComputePipeline,
    pub convolve_layout: wgpu::BindGroupLayout,
    pub multiply: wgpu::ComputePipeline,
    pub divide_with_floor: wgpu::ComputePipeline,
    pub binary_layout: wgpu::BindGroupLayout,
    pub clamp: wgpu::ComputePipeline,
    pub clamp_layout: wgpu::BindGroupLayout,
    pub count_non_finite: wgpu::ComputePipeline,
    pub count_layout: wgpu::BindGroupLayout,
}

impl KernelPipelines {
    /// Compile every shader module and build its pipelines.
    pub fn new(device: &wgpu::Device) -> Self {
        // ── Convolution ──────────────────────────────────────────────
        let convolve_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("lucy_convolve_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/convolve.wgsl").into()),
        });
        let convolve_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lucy_convolve_layout"),
            entries: &[
                storage_ro_entry(0, 4),
                storage_ro_entry(1, 4),
                storage_rw_entry(2, 4),
                uniform_entry(3, size_of::<ConvolveParams>() as u64),
            ],
        });
        let convolve = compute_pipeline(device, &convolve_layout, &convolve_shader, "convolve");

        // ── Element-wise arithmetic ──────────────────────────────────
        let elementwise_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("lucy_elementwise_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/elementwise.wgsl").into()),
        });
        let binary_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lucy_binary_layout"),
            entries: &[
                storage_ro_entry(0, 4),
                storage_ro_entry(1, 4),
                storage_rw_entry(2, 4),
                uniform_entry(3, size_of::<ElementwiseParams>() as u64),
            ],
        });
        let multiply = compute_pipeline(device, &binary_layout, &elementwise_shader, "multiply");
        let divide_with_floor = compute_pipeline(
            device,
            &binary_layout,
            &elementwise_shader,
            "divide_with_floor",
        );

        // ── Clamp ────────────────────────────────────────────────────
        let clamp_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("lucy_clamp_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/clamp.wgsl").into()),
        });
        let clamp_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lucy_clamp_layout"),
            entries: &[
                storage_rw_entry(0, 4),
                uniform_entry(1, size_of::<ClampParams>() as u64),
            ],
        });
        let clamp = compute_pipeline(device, &clamp_layout, &clamp_shader, "clamp_in_place");

        // ── Finiteness count ─────────────────────────────────────────
        let finite_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("lucy_finite_shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/finite.wgsl").into()),
        });
        let count_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lucy_count_layout"),
            entries: &[
                storage_ro_entry(0, 4),
                storage_rw_entry(1, 4),
                uniform_entry(2, size_of::<CountParams>() as u64),
            ],
        });
        let count_non_finite =
            compute_pipeline(device, &count_layout, &finite_shader, "count_non_finite");

        Self {
            convolve,
            convolve_layout,
            multiply,
            divide_with_floor,
            binary_layout,
            clamp,
            clamp_layout,
            count_non_finite,
            count_layout,
        }
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn compute_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    module: &wgpu::ShaderModule,
    entry_point: &str,
) -> wgpu::ComputePipeline {
    let label = format!("lucy_{entry_point}_pipeline");
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(&label),
        layout: Some(&pipeline_layout),
        module,
        entry_point: Some(entry_point),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    })
}

fn storage_ro_entry(binding: u32, min_size: u64) -> wgpu::BindGroupLayoutEntry {
    buffer_entry(
        binding,
        wgpu::BufferBindingType::Storage { read_only: true },
        min_size,
    )
}

fn storage_rw_entry(binding: u32, min_size: u64) -> wgpu::BindGroupLayoutEntry {
    buffer_entry(
        binding,
        wgpu::BufferBindingType::Storage { read_only: false },
        min_size,
    )
}

fn uniform_entry(binding: u32, min_size: u64) -> wgpu::BindGroupLayoutEntry {
    buffer_entry(binding, wgpu::BufferBindingType::Uniform, min_size)
}

fn buffer_entry(
    binding: u32,
    ty: wgpu::BufferBindingType,
    min_size: u64,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(min_size),
        },
        count: None,
    }
}
