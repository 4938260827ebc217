//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;
use lucy_core::Boundary;

use crate::config::{GpuChoice, Overrides};

/// Restore blurred images with stabilized Richardson–Lucy deconvolution.
///
/// Every jpg, jpeg, png, tif or tiff file in the input directory is
/// deconvolved with a Gaussian PSF and written as 8-bit RGB to the output
/// directory under the same name.
#[derive(Debug, Parser)]
#[command(name = "lucy", version, about)]
pub struct Cli {
    /// Directory containing the images to restore.
    #[arg(long)]
    pub input_dir: PathBuf,

    /// Directory for the restored images. Created if missing.
    #[arg(long)]
    pub output_dir: PathBuf,

    /// JSON run file with `psf`, `iterations` and `gpu` sections.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Richardson–Lucy iterations [default: 10]. 8-20 is typical.
    #[arg(long, allow_negative_numbers = true)]
    pub iterations: Option<i64>,

    /// Gaussian PSF side length in pixels, odd [default: 7].
    #[arg(long)]
    pub psf_size: Option<u32>,

    /// Gaussian PSF sigma in pixels [default: 2.0].
    #[arg(long)]
    pub psf_sigma: Option<f64>,

    /// Added to the re-blurred estimate before dividing [default: 1e-6].
    #[arg(long)]
    pub epsilon: Option<f32>,

    /// Lower bound of the per-pixel correction [default: 0.7].
    #[arg(long)]
    pub clamp_low: Option<f32>,

    /// Upper bound of the per-pixel correction [default: 1.3].
    #[arg(long)]
    pub clamp_high: Option<f32>,

    /// Box radius for smoothing the correction, 0 to disable [default: 1].
    #[arg(long)]
    pub smoothing_radius: Option<u32>,

    /// How convolutions treat pixels outside the image [default: reflect].
    #[arg(long, value_enum)]
    pub boundary: Option<BoundaryArg>,

    /// Compute backend [default: auto, or LUCY_GPU].
    #[arg(long, value_enum)]
    pub gpu: Option<GpuChoice>,

    /// Log per-channel and per-iteration detail.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BoundaryArg {
    Reflect,
    Zero,
}

impl From<BoundaryArg> for Boundary {
    fn from(arg: BoundaryArg) -> Self {
        match arg {
            BoundaryArg::Reflect => Boundary::Reflect,
            BoundaryArg::Zero => Boundary::Zero,
        }
    }
}

impl Cli {
    /// Values given on the command line, for layering over the run file.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            iterations: self.iterations,
            psf_size: self.psf_size,
            psf_sigma: self.psf_sigma,
            epsilon: self.epsilon,
            clamp_low: self.clamp_low,
            clamp_high: self.clamp_high,
            smoothing_radius: self.smoothing_radius,
            boundary: self.boundary.map(Boundary::from),
            gpu: self.gpu,
        }
    }
}
