//! Run parameters for PSF construction and the iteration loop.
//!
//! These are plain values supplied by the caller. They are validated once,
//! before any array is touched.

use serde::{Deserialize, Serialize};

use crate::convolution::Boundary;
use crate::error::{DeconvError, Result};
use crate::psf::{MAX_KERNEL_SIDE, Psf};

/// Iteration counts above this are discouraged without external denoising.
pub const DISCOURAGED_ITERATIONS: u32 = 40;

/// Parameters of the Gaussian PSF.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsfConfig {
    /// Kernel side length. Must be odd.
    pub size: u32,
    /// Gaussian sigma in pixels.
    pub spread: f64,
}

impl Default for PsfConfig {
    fn default() -> Self {
        Self {
            size: 7,
            spread: 2.0,
        }
    }
}

impl PsfConfig {
    /// Build the normalized PSF described by this config.
    pub fn build(&self) -> Result<Psf> {
        Psf::gaussian(self.size, self.spread)
    }
}

/// Parameters of the stabilized Richardson–Lucy loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterationConfig {
    /// Number of multiplicative updates. 0 returns the initial estimate.
    pub iteration_count: u32,
    /// Added to the re-blurred estimate before dividing.
    pub epsilon: f32,
    /// Lower bound of the per-pixel correction factor.
    pub clamp_low: f32,
    /// Upper bound of the per-pixel correction factor.
    pub clamp_high: f32,
    /// Radius of the box average applied to the correction. 0 disables it.
    pub smoothing_radius: u32,
    /// Lower bound of the estimate after each update.
    pub valid_low: f32,
    /// Upper bound of the estimate after each update.
    pub valid_high: f32,
    /// Boundary policy for every convolution of the run.
    pub boundary: Boundary,
}

impl Default for IterationConfig {
    fn default() -> Self {
        Self {
            iteration_count: 10,
            epsilon: 1e-6,
            clamp_low: 0.7,
            clamp_high: 1.3,
            smoothing_radius: 1,
            valid_low: 0.0,
            valid_high: 1.0,
            boundary: Boundary::Reflect,
        }
    }
}

impl IterationConfig {
    /// Check every invariant the loop relies on.
    pub fn validate(&self) -> Result<()> {
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(DeconvError::invalid(format!(
                "epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if !self.clamp_low.is_finite() || !self.clamp_high.is_finite() {
            return Err(DeconvError::invalid("clamp bounds must be finite"));
        }
        if self.clamp_low < 0.0 {
            return Err(DeconvError::invalid(format!(
                "clamp_low must not be negative, got {}",
                self.clamp_low
            )));
        }
        if self.clamp_low >= self.clamp_high {
            return Err(DeconvError::invalid(format!(
                "clamp bounds inverted: [{}, {}]",
                self.clamp_low, self.clamp_high
            )));
        }
        if !self.valid_low.is_finite()
            || !self.valid_high.is_finite()
            || self.valid_low >= self.valid_high
        {
            return Err(DeconvError::invalid(format!(
                "valid range must be finite and ordered: [{}, {}]",
                self.valid_low, self.valid_high
            )));
        }
        if self.smoothing_radius > MAX_KERNEL_SIDE / 2 {
            return Err(DeconvError::invalid(format!(
                "smoothing radius {} exceeds the maximum of {}",
                self.smoothing_radius,
                MAX_KERNEL_SIDE / 2
            )));
        }
        Ok(())
    }

    /// True above [`DISCOURAGED_ITERATIONS`]. Allowed, but callers should warn.
    pub fn is_discouraged(&self) -> bool {
        self.iteration_count > DISCOURAGED_ITERATIONS
    }

    /// Convert a signed count from a parsing layer, rejecting negatives.
    pub fn checked_iteration_count(count: i64) -> Result<u32> {
        u32::try_from(count).map_err(|_| {
            DeconvError::invalid(format!(
                "iteration count must be a non-negative integer, got {count}"
            ))
        })
    }
}
