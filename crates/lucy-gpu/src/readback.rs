//! GPU-to-CPU readback of planes and counters.

use lucy_core::error::{DeconvError, Result};
use lucy_core::image::Plane;
use parking_lot::Mutex;

use crate::buffers::GpuPlane;

/// Reusable `MAP_READ` buffer for plane downloads.
///
/// Grows to the largest plane seen. The lock is held for the whole
/// copy-map-read sequence, so concurrent channel downloads serialize here.
pub struct StagingCache {
    buffer: Mutex<Option<wgpu::Buffer>>,
}

impl StagingCache {
    pub fn new() -> Self {
        Self {
            buffer: Mutex::new(None),
        }
    }

    /// Copy `plane` to host memory.
    pub fn download(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        plane: &GpuPlane,
    ) -> Result<Plane> {
        let size = plane.byte_size();
        if size == 0 {
            return Plane::new(plane.width, plane.height, Vec::new());
        }

        let mut cached = self.buffer.lock();
        let staging = match cached.take() {
            Some(buffer) if buffer.size() >= size => buffer,
            _ => create_staging(device, "lucy_plane_staging", size),
        };

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("lucy_download_encoder"),
        });
        encoder.copy_buffer_to_buffer(&plane.buffer, 0, &staging, 0, size);
        queue.submit(std::iter::once(encoder.finish()));

        let data: Vec<f32> = {
            map_and_wait(device, &staging, size)?;
            let mapped = staging.slice(..size).get_mapped_range();
            bytemuck::cast_slice(&mapped).to_vec()
        };
        staging.unmap();
        *cached = Some(staging);

        Plane::new(plane.width, plane.height, data)
    }
}

impl Default for StagingCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a single `u32` (e.g. an atomic counter) back from `source`.
pub fn read_u32(device: &wgpu::Device, queue: &wgpu::Queue, source: &wgpu::Buffer) -> Result<u32> {
    let staging = create_staging(device, "lucy_counter_staging", 4);
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("lucy_counter_encoder"),
    });
    encoder.copy_buffer_to_buffer(source, 0, &staging, 0, 4);
    queue.submit(std::iter::once(encoder.finish()));

    map_and_wait(device, &staging, 4)?;
    let value = {
        let mapped = staging.slice(..4).get_mapped_range();
        bytemuck::pod_read_unaligned::<u32>(&mapped)
    };
    staging.unmap();
    staging.destroy();
    Ok(value)
}

// ── Helpers ─────────────────────────────────────────────────────────

fn create_staging(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    })
}

/// Map the first `size` bytes of `staging` for reading and block until done.
fn map_and_wait(device: &wgpu::Device, staging: &wgpu::Buffer, size: u64) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    staging
        .slice(..size)
        .map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
    device
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|e| DeconvError::Backend(format!("device poll failed: {e}")))?;
    rx.recv()
        .map_err(|_| DeconvError::Backend("map callback was dropped".into()))?
        .map_err(|e| DeconvError::Backend(format!("buffer map failed: {e}")))
}
