//! In-process CPU backend. Per-pixel work runs on the rayon pool.

use rayon::prelude::*;

use crate::backend::ComputeBackend;
use crate::convolution::{self, Boundary, ConvolutionMode};
use crate::error::{DeconvError, Result};
use crate::image::Plane;
use crate::psf::Psf;

/// CPU array engine operating on host [`Plane`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }
}

fn check_same_shape(a: &Plane, b: &Plane) -> Result<()> {
    if a.dimensions() != b.dimensions() {
        return Err(DeconvError::Backend(format!(
            "operand shapes differ: {:?} vs {:?}",
            a.dimensions(),
            b.dimensions()
        )));
    }
    Ok(())
}

fn zip_map(a: &Plane, b: &Plane, f: impl Fn(f32, f32) -> f32 + Sync) -> Result<Plane> {
    check_same_shape(a, b)?;
    let data = a
        .data
        .par_iter()
        .zip(b.data.par_iter())
        .map(|(&x, &y)| f(x, y))
        .collect();
    Ok(Plane {
        width: a.width,
        height: a.height,
        data,
    })
}

impl ComputeBackend for CpuBackend {
    type Tensor = Plane;
    type Kernel = Psf;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn upload(&self, plane: &Plane) -> Result<Plane> {
        Ok(plane.clone())
    }

    fn download(&self, tensor: &Plane) -> Result<Plane> {
        Ok(tensor.clone())
    }

    fn upload_kernel(&self, kernel: &Psf) -> Result<Psf> {
        Ok(kernel.clone())
    }

    fn convolve(
        &self,
        input: &Plane,
        kernel: &Psf,
        mode: ConvolutionMode,
        boundary: Boundary,
    ) -> Result<Plane> {
        Ok(convolution::apply(input, kernel, mode, boundary))
    }

    fn multiply(&self, a: &Plane, b: &Plane) -> Result<Plane> {
        zip_map(a, b, |x, y| x * y)
    }

    fn divide_with_floor(&self, numerator: &Plane, denominator: &Plane, floor: f32) -> Result<Plane> {
        zip_map(numerator, denominator, |n, d| n / (d + floor))
    }

    fn clamp(&self, tensor: &mut Plane, low: f32, high: f32) -> Result<()> {
        // `f32::clamp` panics on these; report them instead.
        if low.is_nan() || high.is_nan() || low > high {
            return Err(DeconvError::Backend(format!(
                "invalid clamp range [{low}, {high}]"
            )));
        }
        tensor
            .data
            .par_iter_mut()
            .for_each(|v| *v = v.clamp(low, high));
        Ok(())
    }

    fn all_finite(&self, tensor: &Plane) -> Result<bool> {
        Ok(tensor.data.par_iter().all(|v| v.is_finite()))
    }
}
