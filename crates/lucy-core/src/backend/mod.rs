//! Compute backend abstraction.
//!
//! The iterator and channel processor are written against [`ComputeBackend`]
//! only. Each backend owns its tensor representation, so tensors from one
//! backend cannot be handed to another. Every implementation must produce
//! results equal to [`cpu::CpuBackend`] within floating-point tolerance.

pub mod cpu;

use crate::convolution::{Boundary, ConvolutionMode};
use crate::error::Result;
use crate::image::Plane;
use crate::psf::Psf;

/// Numeric array engine used by the deconvolution loop.
pub trait ComputeBackend: Send + Sync {
    /// Backend-resident single-channel tensor.
    type Tensor: Send;
    /// Backend-resident convolution kernel, shared read-only across channels.
    type Kernel: Send + Sync;

    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Copy a host plane into backend memory.
    fn upload(&self, plane: &Plane) -> Result<Self::Tensor>;

    /// Copy a tensor back to host memory.
    fn download(&self, tensor: &Self::Tensor) -> Result<Plane>;

    /// Copy a kernel into backend memory.
    fn upload_kernel(&self, kernel: &Psf) -> Result<Self::Kernel>;

    /// Same-shape convolution, see [`crate::convolution::apply`].
    fn convolve(
        &self,
        input: &Self::Tensor,
        kernel: &Self::Kernel,
        mode: ConvolutionMode,
        boundary: Boundary,
    ) -> Result<Self::Tensor>;

    /// Elementwise `a * b`.
    fn multiply(&self, a: &Self::Tensor, b: &Self::Tensor) -> Result<Self::Tensor>;

    /// Elementwise `numerator / (denominator + floor)`.
    fn divide_with_floor(
        &self,
        numerator: &Self::Tensor,
        denominator: &Self::Tensor,
        floor: f32,
    ) -> Result<Self::Tensor>;

    /// Clamp every element to `[low, high]` in place. NaN stays NaN.
    fn clamp(&self, tensor: &mut Self::Tensor, low: f32, high: f32) -> Result<()>;

    /// True when no element is NaN or infinite.
    fn all_finite(&self, tensor: &Self::Tensor) -> Result<bool>;
}
