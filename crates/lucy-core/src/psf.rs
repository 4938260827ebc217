//! Point-spread function construction.
//!
//! A [`Psf`] is an immutable, non-negative 2-D kernel whose weights sum to 1.
//! It is built once per run and shared read-only by every channel.

use serde::{Deserialize, Serialize};

use crate::error::{DeconvError, Result};

/// Raw kernel sums below this are treated as zero.
const MIN_KERNEL_SUM: f64 = 1e-12;

/// Largest kernel side accepted by the builders.
pub const MAX_KERNEL_SIDE: u32 = 1025;

/// Normalized 2-D blur kernel, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Psf {
    width: u32,
    height: u32,
    weights: Vec<f32>,
}

impl Psf {
    /// Build a normalized Gaussian PSF.
    ///
    /// `size` must be odd and positive, `spread` (the Gaussian sigma) positive.
    /// Weights follow `exp(-(x² + y²) / (2σ²))` around the kernel midpoint and
    /// are divided by their raw sum.
    pub fn gaussian(size: u32, spread: f64) -> Result<Self> {
        if size == 0 || size % 2 == 0 {
            return Err(DeconvError::invalid(format!(
                "PSF size must be an odd positive integer, got {size}"
            )));
        }
        if size > MAX_KERNEL_SIDE {
            return Err(DeconvError::invalid(format!(
                "PSF size {size} exceeds the maximum of {MAX_KERNEL_SIDE}"
            )));
        }
        if !spread.is_finite() || spread <= 0.0 {
            return Err(DeconvError::invalid(format!(
                "PSF spread must be positive, got {spread}"
            )));
        }

        let center = (size / 2) as f64;
        let denom = 2.0 * spread * spread;
        let raw: Vec<f64> = (0..size)
            .flat_map(|y| {
                (0..size).map(move |x| {
                    let dx = x as f64 - center;
                    let dy = y as f64 - center;
                    (-(dx * dx + dy * dy) / denom).exp()
                })
            })
            .collect();

        Self::normalized(size, size, raw)
    }

    /// Normalized uniform kernel of side `2 * radius + 1`.
    ///
    /// Used as the local-averaging operator that damps the correction signal.
    pub fn box_kernel(radius: u32) -> Result<Self> {
        let side = radius
            .checked_mul(2)
            .and_then(|d| d.checked_add(1))
            .filter(|&side| side <= MAX_KERNEL_SIDE)
            .ok_or_else(|| {
                DeconvError::invalid(format!(
                    "box radius {radius} exceeds the maximum of {}",
                    MAX_KERNEL_SIDE / 2
                ))
            })?;
        let count = side as usize * side as usize;
        Ok(Self {
            width: side,
            height: side,
            weights: vec![1.0 / count as f32; count],
        })
    }

    /// Build a PSF from arbitrary non-negative weights, normalizing their sum to 1.
    pub fn from_weights(width: u32, height: u32, weights: Vec<f32>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(DeconvError::invalid("PSF must not be empty"));
        }
        if weights.len() != width as usize * height as usize {
            return Err(DeconvError::invalid(format!(
                "PSF has {} weights, expected {}",
                weights.len(),
                width as usize * height as usize
            )));
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(DeconvError::invalid(
                "PSF weights must be finite and non-negative",
            ));
        }
        Self::normalized(width, height, weights.into_iter().map(f64::from).collect())
    }

    fn normalized(width: u32, height: u32, raw: Vec<f64>) -> Result<Self> {
        let sum: f64 = raw.iter().sum();
        if !sum.is_finite() || sum < MIN_KERNEL_SUM {
            return Err(DeconvError::DegenerateKernel);
        }
        Ok(Self {
            width,
            height,
            weights: raw.into_iter().map(|w| (w / sum) as f32).collect(),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Row-major weights.
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Weight at column `x`, row `y`.
    pub fn weight(&self, x: u32, y: u32) -> f32 {
        self.weights[y as usize * self.width as usize + x as usize]
    }

    /// Sum of all weights, accumulated in f64.
    pub fn sum(&self) -> f64 {
        self.weights.iter().map(|&w| f64::from(w)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gaussian_is_normalized() {
        for (size, spread) in [(1, 0.5), (3, 1.0), (7, 2.0), (15, 0.3), (31, 8.0)] {
            let psf = Psf::gaussian(size, spread).unwrap();
            assert!(
                (psf.sum() - 1.0).abs() < 1e-6,
                "size {size} spread {spread}: sum {}",
                psf.sum()
            );
        }
    }

    #[test]
    fn test_gaussian_is_symmetric_and_peaks_at_center() {
        let psf = Psf::gaussian(5, 1.2).unwrap();
        let center = psf.weight(2, 2);
        for y in 0..5 {
            for x in 0..5 {
                assert_eq!(psf.weight(x, y), psf.weight(4 - x, 4 - y));
                assert_eq!(psf.weight(x, y), psf.weight(y, x));
                assert!(psf.weight(x, y) <= center);
            }
        }
    }

    #[test]
    fn test_gaussian_rejects_bad_parameters() {
        for (size, spread) in [(4, 1.0), (0, 1.0), (3, 0.0), (3, -1.0), (3, f64::NAN)] {
            assert!(
                matches!(
                    Psf::gaussian(size, spread),
                    Err(DeconvError::InvalidParameter(_))
                ),
                "size {size} spread {spread} should be rejected"
            );
        }
    }

    #[test]
    fn test_all_zero_weights_are_degenerate() {
        assert_eq!(
            Psf::from_weights(3, 3, vec![0.0; 9]),
            Err(DeconvError::DegenerateKernel)
        );
    }

    #[test]
    fn test_tiny_spread_underflows_to_delta() {
        // Off-center weights underflow, the center alone carries the mass.
        let psf = Psf::gaussian(3, 1e-3).unwrap();
        assert!((psf.weight(1, 1) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_box_kernel_is_uniform() {
        let k = Psf::box_kernel(1).unwrap();
        assert_eq!(k.dimensions(), (3, 3));
        assert!(k.weights().iter().all(|&w| (w - 1.0 / 9.0).abs() < 1e-7));
        assert_eq!(Psf::box_kernel(0).unwrap().weights(), &[1.0]);
        assert_eq!(Psf::box_kernel(MAX_KERNEL_SIDE / 2).unwrap().width(), MAX_KERNEL_SIDE);
    }

    #[test]
    fn test_oversized_kernels_are_rejected() {
        for radius in [MAX_KERNEL_SIDE / 2 + 1, 70_000, u32::MAX / 2, u32::MAX] {
            assert!(
                matches!(
                    Psf::box_kernel(radius),
                    Err(DeconvError::InvalidParameter(_))
                ),
                "radius {radius} should be rejected"
            );
        }
        for size in [MAX_KERNEL_SIDE + 2, u32::MAX] {
            assert!(
                matches!(
                    Psf::gaussian(size, 2.0),
                    Err(DeconvError::InvalidParameter(_))
                ),
                "size {size} should be rejected"
            );
        }
    }
}
