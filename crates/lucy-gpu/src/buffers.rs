//! Device-resident planes and kernels.
//!
//! Every handle owns its storage buffer and destroys it on drop, so
//! intermediate tensors of an iteration are released as soon as they go
//! out of scope instead of waiting for the device's own cleanup.

use lucy_core::error::{DeconvError, Result};
use lucy_core::image::Plane;
use lucy_core::psf::Psf;
use wgpu::util::DeviceExt;

/// Bytes per `f32` element.
const ELEMENT_SIZE: u64 = 4;

const STORAGE_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::COPY_SRC)
    .union(wgpu::BufferUsages::COPY_DST);

/// Storage buffers cannot be empty; an empty plane gets one padding element.
fn padded_contents(data: &[f32]) -> &[u8] {
    if data.is_empty() {
        bytemuck::cast_slice(&[0.0f32])
    } else {
        bytemuck::cast_slice(data)
    }
}

/// Largest plane the shaders can address; `convolve.wgsl` indexes with `i32`.
pub const MAX_PLANE_ELEMENTS: u32 = i32::MAX as u32;

/// Element count of a `width` x `height` plane, refusing planes the shaders
/// cannot address.
pub fn checked_len(width: u32, height: u32) -> Result<u32> {
    width
        .checked_mul(height)
        .filter(|&len| len <= MAX_PLANE_ELEMENTS)
        .ok_or_else(|| {
            DeconvError::Backend(format!(
                "{width}x{height} plane exceeds the GPU element limit of {MAX_PLANE_ELEMENTS}"
            ))
        })
}

/// One channel stored as a flat `array<f32>` in row-major order.
pub struct GpuPlane {
    pub buffer: wgpu::Buffer,
    pub width: u32,
    pub height: u32,
    len: u32,
}

impl GpuPlane {
    /// Upload a [`Plane`] as a storage buffer.
    pub fn upload(device: &wgpu::Device, plane: &Plane) -> Result<Self> {
        let len = checked_len(plane.width, plane.height)?;
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("lucy_plane_upload"),
            contents: padded_contents(&plane.data),
            usage: STORAGE_USAGE,
        });
        Ok(Self {
            buffer,
            width: plane.width,
            height: plane.height,
            len,
        })
    }

    /// Allocate an uninitialized plane for shader output.
    pub fn create_output(device: &wgpu::Device, width: u32, height: u32) -> Result<Self> {
        let len = checked_len(width, height)?;
        let size = u64::from(len.max(1)) * ELEMENT_SIZE;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("lucy_plane_output"),
            size,
            usage: STORAGE_USAGE,
            mapped_at_creation: false,
        });
        Ok(Self {
            buffer,
            width,
            height,
            len,
        })
    }

    pub fn pixel_count(&self) -> u32 {
        self.len
    }

    /// Size of the pixel data in bytes, excluding any padding element.
    pub fn byte_size(&self) -> u64 {
        u64::from(self.pixel_count()) * ELEMENT_SIZE
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for GpuPlane {
    fn drop(&mut self) {
        self.buffer.destroy();
    }
}

/// Convolution weights in row-major order.
pub struct GpuKernel {
    pub buffer: wgpu::Buffer,
    pub width: u32,
    pub height: u32,
}

impl GpuKernel {
    pub fn upload(device: &wgpu::Device, psf: &Psf) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("lucy_kernel_upload"),
            contents: padded_contents(psf.weights()),
            usage: wgpu::BufferUsages::STORAGE,
        });
        Self {
            buffer,
            width: psf.width(),
            height: psf.height(),
        }
    }
}

impl Drop for GpuKernel {
    fn drop(&mut self) {
        self.buffer.destroy();
    }
}
