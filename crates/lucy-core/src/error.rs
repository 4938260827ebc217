//! Error taxonomy shared by the core and the backends.

use thiserror::Error;

/// Errors produced while configuring or running a deconvolution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeconvError {
    /// A PSF or iteration parameter is out of range. Raised before any work.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// PSF construction produced a kernel whose weights sum to zero.
    #[error("degenerate kernel: weights sum to zero")]
    DegenerateKernel,
    /// The PSF does not fit inside the image.
    #[error("PSF {psf:?} exceeds image {image:?} (width, height)")]
    DimensionMismatch { psf: (u32, u32), image: (u32, u32) },
    /// A channel produced non-finite values and was rolled back.
    #[error("numerical instability in channel {channel} at iteration {iteration}")]
    NumericalInstability { channel: usize, iteration: u32 },
    /// The requested compute backend could not be provisioned.
    #[error("compute backend unavailable: {0}")]
    BackendUnavailable(String),
    /// A backend primitive failed.
    #[error("backend error: {0}")]
    Backend(String),
}

impl DeconvError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }
}

pub type Result<T> = std::result::Result<T, DeconvError>;
