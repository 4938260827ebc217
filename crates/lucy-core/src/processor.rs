//! Channel processor: split, deconvolve each channel in parallel, remerge.

use rayon::prelude::*;

use crate::backend::ComputeBackend;
use crate::config::{DISCOURAGED_ITERATIONS, IterationConfig};
use crate::error::{DeconvError, Result};
use crate::image::{Image, Plane};
use crate::iterator::{StabilizedIterator, Termination};
use crate::psf::Psf;

/// How one channel's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelReport {
    /// Channel index in the source image.
    pub channel: usize,
    pub termination: Termination,
    /// Updates kept for this channel.
    pub iterations_completed: u32,
}

/// Restored image plus per-channel termination reports.
#[derive(Debug, Clone)]
pub struct Restoration {
    pub image: Image,
    /// One report per channel, in channel order.
    pub channels: Vec<ChannelReport>,
}

impl Restoration {
    /// True when any channel was rolled back after a non-finite update.
    pub fn is_degraded(&self) -> bool {
        self.first_instability().is_some()
    }

    fn first_instability(&self) -> Option<(usize, u32)> {
        self.channels.iter().find_map(|r| match r.termination {
            Termination::NumericalInstability { iteration } => Some((r.channel, iteration)),
            Termination::Completed => None,
        })
    }

    /// The image if every channel completed, otherwise the first instability.
    pub fn into_strict(self) -> Result<Image> {
        match self.first_instability() {
            Some((channel, iteration)) => {
                Err(DeconvError::NumericalInstability { channel, iteration })
            }
            None => Ok(self.image),
        }
    }
}

/// Deconvolve every channel of `image` with `psf` on `backend`.
///
/// Configuration and shape errors are reported before any channel runs.
/// Channels are independent and run as parallel tasks; results are
/// remerged in the original channel order.
pub fn process<B: ComputeBackend>(
    image: &Image,
    psf: &Psf,
    config: &IterationConfig,
    backend: &B,
) -> Result<Restoration> {
    config.validate()?;
    if config.is_discouraged() {
        tracing::warn!(
            "{} iterations requested; more than {DISCOURAGED_ITERATIONS} tends to amplify noise",
            config.iteration_count
        );
    }
    if psf.width() > image.width || psf.height() > image.height {
        return Err(DeconvError::DimensionMismatch {
            psf: psf.dimensions(),
            image: (image.width, image.height),
        });
    }

    tracing::debug!(
        "deconvolving {}x{}x{} on {} ({} iterations)",
        image.width,
        image.height,
        image.channels,
        backend.name(),
        config.iteration_count
    );

    let kernel = backend.upload_kernel(psf)?;
    let results: Vec<(Plane, ChannelReport)> = image
        .split_channels()
        .into_par_iter()
        .enumerate()
        .map(|(channel, plane)| run_channel(backend, &kernel, config, channel, &plane))
        .collect::<Result<_>>()?;

    let (planes, channels): (Vec<Plane>, Vec<ChannelReport>) = results.into_iter().unzip();
    Ok(Restoration {
        image: Image::merge_channels(&planes)?,
        channels,
    })
}

fn run_channel<B: ComputeBackend>(
    backend: &B,
    kernel: &B::Kernel,
    config: &IterationConfig,
    channel: usize,
    plane: &Plane,
) -> Result<(Plane, ChannelReport)> {
    let observed = backend.upload(plane)?;
    // `process` already validated the config.
    let outcome = StabilizedIterator::init_unchecked(backend, observed, kernel, *config)?.run()?;
    let restored = backend.download(&outcome.estimate)?;

    if let Termination::NumericalInstability { iteration } = outcome.termination {
        tracing::warn!("channel {channel}: unstable at iteration {iteration}, result degraded");
    } else {
        tracing::debug!(
            "channel {channel}: {} iterations completed",
            outcome.iterations_completed
        );
    }

    Ok((
        restored,
        ChannelReport {
            channel,
            termination: outcome.termination,
            iterations_completed: outcome.iterations_completed,
        },
    ))
}
