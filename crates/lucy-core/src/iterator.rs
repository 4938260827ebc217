//! Per-channel stabilized Richardson–Lucy loop.
//!
//! One [`StabilizedIterator`] owns the estimate of a single channel. Each
//! [`step`](StabilizedIterator::step) runs one multiplicative update:
//!
//! ```text
//! blurred    = conv(estimate, psf, forward)
//! ratio      = observed / (blurred + epsilon)
//! correction = clamp(smooth(conv(ratio, psf, correlate)), clamp_low, clamp_high)
//! estimate   = clamp(estimate * correction, valid_low, valid_high)
//! ```
//!
//! An update that produces any non-finite value is discarded and the loop
//! terminates with the previous estimate.

use crate::backend::ComputeBackend;
use crate::config::IterationConfig;
use crate::convolution::ConvolutionMode;
use crate::error::Result;
use crate::psf::Psf;

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// All configured iterations ran.
    Completed,
    /// Iteration `iteration` produced a non-finite value and was rolled back.
    NumericalInstability { iteration: u32 },
}

/// Lifecycle of one channel's loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorState {
    /// Initial estimate ready, no update applied yet.
    Init,
    /// `k` updates applied, more remain.
    Iterating(u32),
    /// No further updates will run.
    Terminated(Termination),
}

/// Final estimate of one channel.
#[derive(Debug)]
pub struct IterationOutcome<T> {
    /// Last finite estimate.
    pub estimate: T,
    pub termination: Termination,
    /// Updates that were kept.
    pub iterations_completed: u32,
}

/// Richardson–Lucy loop over one channel, generic over the compute backend.
pub struct StabilizedIterator<'a, B: ComputeBackend> {
    backend: &'a B,
    psf: &'a B::Kernel,
    smoothing: Option<B::Kernel>,
    config: IterationConfig,
    observed: B::Tensor,
    estimate: B::Tensor,
    completed: u32,
    state: IteratorState,
}

impl<'a, B: ComputeBackend> StabilizedIterator<'a, B> {
    /// Validate `config` and compute the initial estimate.
    ///
    /// The initial estimate is the observed channel blurred once by the PSF,
    /// which keeps the first update from amplifying pixel noise.
    pub fn new(
        backend: &'a B,
        observed: B::Tensor,
        psf: &'a B::Kernel,
        config: IterationConfig,
    ) -> Result<Self> {
        config.validate()?;
        Self::init_unchecked(backend, observed, psf, config)
    }

    /// Like [`new`](Self::new) for a config the caller has already validated.
    pub(crate) fn init_unchecked(
        backend: &'a B,
        observed: B::Tensor,
        psf: &'a B::Kernel,
        config: IterationConfig,
    ) -> Result<Self> {
        let smoothing = match config.smoothing_radius {
            0 => None,
            r => Some(backend.upload_kernel(&Psf::box_kernel(r)?)?),
        };
        let estimate =
            backend.convolve(&observed, psf, ConvolutionMode::Forward, config.boundary)?;

        Ok(Self {
            backend,
            psf,
            smoothing,
            config,
            observed,
            estimate,
            completed: 0,
            state: IteratorState::Init,
        })
    }

    pub fn state(&self) -> IteratorState {
        self.state
    }

    /// Current estimate.
    pub fn estimate(&self) -> &B::Tensor {
        &self.estimate
    }

    /// Run one update. Once terminated this is a no-op returning the final state.
    pub fn step(&mut self) -> Result<IteratorState> {
        if let IteratorState::Terminated(_) = self.state {
            return Ok(self.state);
        }
        if self.completed >= self.config.iteration_count {
            self.state = IteratorState::Terminated(Termination::Completed);
            return Ok(self.state);
        }

        let iteration = self.completed + 1;
        let next = self.update()?;

        if !self.backend.all_finite(&next)? {
            tracing::warn!(
                "non-finite estimate at iteration {iteration}, keeping iteration {}",
                self.completed
            );
            self.state = IteratorState::Terminated(Termination::NumericalInstability { iteration });
            return Ok(self.state);
        }

        self.estimate = next;
        self.completed = iteration;
        self.state = if iteration == self.config.iteration_count {
            IteratorState::Terminated(Termination::Completed)
        } else {
            IteratorState::Iterating(iteration)
        };
        tracing::debug!("iteration {iteration} applied");
        Ok(self.state)
    }

    fn update(&self) -> Result<B::Tensor> {
        let b = self.backend;
        let c = &self.config;

        let blurred = b.convolve(&self.estimate, self.psf, ConvolutionMode::Forward, c.boundary)?;
        let ratio = b.divide_with_floor(&self.observed, &blurred, c.epsilon)?;
        let mut correction = b.convolve(&ratio, self.psf, ConvolutionMode::Correlate, c.boundary)?;
        if let Some(smoothing) = &self.smoothing {
            correction = b.convolve(&correction, smoothing, ConvolutionMode::Forward, c.boundary)?;
        }
        b.clamp(&mut correction, c.clamp_low, c.clamp_high)?;

        let mut next = b.multiply(&self.estimate, &correction)?;
        b.clamp(&mut next, c.valid_low, c.valid_high)?;
        Ok(next)
    }

    /// Step until terminated and hand back the last finite estimate.
    pub fn run(mut self) -> Result<IterationOutcome<B::Tensor>> {
        loop {
            if let IteratorState::Terminated(termination) = self.step()? {
                return Ok(IterationOutcome {
                    estimate: self.estimate,
                    termination,
                    iterations_completed: self.completed,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::cpu::CpuBackend;
    use crate::convolution::{self, Boundary};
    use crate::error::DeconvError;
    use crate::image::Plane;

    fn scenario_config() -> IterationConfig {
        IterationConfig {
            iteration_count: 10,
            epsilon: 1e-3,
            clamp_low: 0.5,
            clamp_high: 2.0,
            smoothing_radius: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_flat_image_is_a_fixed_point() {
        let backend = CpuBackend::new();
        let psf = Psf::gaussian(3, 1.0).unwrap();
        let observed = Plane::filled(4, 4, 0.5);

        let outcome = StabilizedIterator::new(&backend, observed, &psf, scenario_config())
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(outcome.termination, Termination::Completed);
        assert_eq!(outcome.iterations_completed, 10);
        assert_eq!(outcome.estimate.dimensions(), (4, 4));
        for v in &outcome.estimate.data {
            assert!((0.0..=1.0).contains(v));
            assert!((v - 0.5).abs() < 1e-2, "{v} drifted from 0.5");
        }
    }

    #[test]
    fn test_zero_iterations_returns_single_blur() {
        let backend = CpuBackend::new();
        let psf = Psf::gaussian(3, 1.0).unwrap();
        let mut observed = Plane::filled(6, 6, 0.1);
        observed.data[14] = 0.9;

        let config = IterationConfig {
            iteration_count: 0,
            ..Default::default()
        };
        let expected = convolution::apply(
            &observed,
            &psf,
            ConvolutionMode::Forward,
            Boundary::Reflect,
        );
        let outcome = StabilizedIterator::new(&backend, observed.clone(), &psf, config)
            .unwrap()
            .run()
            .unwrap();

        assert_eq!(outcome.termination, Termination::Completed);
        assert_eq!(outcome.iterations_completed, 0);
        assert_eq!(outcome.estimate, expected);
        assert_ne!(outcome.estimate, observed);
    }

    #[test]
    fn test_zero_epsilon_on_black_channel_terminates() {
        let backend = CpuBackend::new();
        let psf = Psf::gaussian(3, 1.0).unwrap();
        let observed = Plane::filled(5, 5, 0.0);
        let config = IterationConfig {
            epsilon: 0.0,
            ..scenario_config()
        };

        // The public constructor refuses epsilon = 0; bypass it to reach the guard.
        let iter = StabilizedIterator::init_unchecked(&backend, observed, &psf, config).unwrap();
        let outcome = iter.run().unwrap();

        assert_eq!(
            outcome.termination,
            Termination::NumericalInstability { iteration: 1 }
        );
        assert_eq!(outcome.iterations_completed, 0);
        assert!(outcome.estimate.is_finite());
        assert!(outcome.estimate.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let backend = CpuBackend::new();
        let psf = Psf::gaussian(3, 1.0).unwrap();
        let config = IterationConfig {
            epsilon: 0.0,
            ..Default::default()
        };
        let result = StabilizedIterator::new(&backend, Plane::filled(4, 4, 0.5), &psf, config);
        assert!(matches!(result, Err(DeconvError::InvalidParameter(_))));
    }

    /// 16x16 checkerboard of 4-pixel blocks at 0.05 and 0.95.
    fn checkerboard() -> Plane {
        let data = (0..16)
            .flat_map(|y| (0..16).map(move |x| if (x / 4 + y / 4) % 2 == 0 { 0.95 } else { 0.05 }))
            .collect();
        Plane::new(16, 16, data).unwrap()
    }

    #[test]
    fn test_per_pixel_change_stays_within_correction_bounds() {
        let backend = CpuBackend::new();
        let psf = Psf::gaussian(7, 2.0).unwrap();
        // Headroom above 1 so bright pixels are not pinned by the valid range.
        let config = IterationConfig {
            iteration_count: 5,
            valid_high: 2.0,
            ..Default::default()
        };
        let mut iter = StabilizedIterator::new(&backend, checkerboard(), &psf, config).unwrap();

        let (mut hit_low, mut hit_high) = (false, false);
        loop {
            let before = iter.estimate().clone();
            if let IteratorState::Terminated(reason) = iter.step().unwrap() {
                assert_eq!(reason, Termination::Completed);
                break;
            }
            for (prev, next) in before.data.iter().zip(&iter.estimate().data) {
                // Pixels pinned by the valid range are not a pure correction.
                if *prev <= 0.0 || *next <= config.valid_low || *next >= config.valid_high {
                    continue;
                }
                let factor = next / prev;
                assert!(
                    factor >= config.clamp_low * (1.0 - 1e-5)
                        && factor <= config.clamp_high * (1.0 + 1e-5),
                    "factor {factor} outside [{}, {}]",
                    config.clamp_low,
                    config.clamp_high
                );
                hit_low |= (factor - config.clamp_low).abs() < 1e-4;
                hit_high |= (factor - config.clamp_high).abs() < 1e-4;
            }
        }
        // Edges of this pattern drive the raw correction past both bounds.
        assert!(hit_low, "no pixel was limited by clamp_low");
        assert!(hit_high, "no pixel was limited by clamp_high");
    }

    #[test]
    fn test_smoothing_averages_the_correction() {
        let backend = CpuBackend::new();
        let psf = Psf::gaussian(3, 1.0).unwrap();
        let mut observed = Plane::filled(9, 9, 0.2);
        observed.data[40] = 0.9;
        observed.data[12] = 0.6;
        let smoothed = IterationConfig {
            iteration_count: 1,
            epsilon: 1e-3,
            clamp_low: 0.5,
            clamp_high: 2.0,
            smoothing_radius: 1,
            ..Default::default()
        };
        let unsmoothed = IterationConfig {
            smoothing_radius: 0,
            ..smoothed
        };

        let run = |config| {
            StabilizedIterator::new(&backend, observed.clone(), &psf, config)
                .unwrap()
                .run()
                .unwrap()
                .estimate
        };
        let with_box = run(smoothed);
        let without_box = run(unsmoothed);
        assert_ne!(with_box, without_box);

        // One update composed by hand with an explicit 3x3 box average.
        let conv = |p: &Plane, k: &Psf, mode| convolution::apply(p, k, mode, Boundary::Reflect);
        let estimate0 = conv(&observed, &psf, ConvolutionMode::Forward);
        let blurred = conv(&estimate0, &psf, ConvolutionMode::Forward);
        let ratio = backend
            .divide_with_floor(&observed, &blurred, smoothed.epsilon)
            .unwrap();
        let raw = conv(&ratio, &psf, ConvolutionMode::Correlate);
        let mut correction = conv(&raw, &Psf::box_kernel(1).unwrap(), ConvolutionMode::Forward);
        backend
            .clamp(&mut correction, smoothed.clamp_low, smoothed.clamp_high)
            .unwrap();
        let mut expected = backend.multiply(&estimate0, &correction).unwrap();
        backend.clamp(&mut expected, 0.0, 1.0).unwrap();

        assert_eq!(with_box, expected);
    }

    #[test]
    fn test_state_machine_progression() {
        let backend = CpuBackend::new();
        let psf = Psf::gaussian(3, 1.0).unwrap();
        let config = IterationConfig {
            iteration_count: 2,
            ..Default::default()
        };
        let mut iter =
            StabilizedIterator::new(&backend, Plane::filled(4, 4, 0.4), &psf, config).unwrap();

        assert_eq!(iter.state(), IteratorState::Init);
        assert_eq!(iter.step().unwrap(), IteratorState::Iterating(1));
        assert_eq!(
            iter.step().unwrap(),
            IteratorState::Terminated(Termination::Completed)
        );
        // Further steps do not change anything.
        let before = iter.estimate().clone();
        assert_eq!(
            iter.step().unwrap(),
            IteratorState::Terminated(Termination::Completed)
        );
        assert_eq!(iter.estimate(), &before);
    }
}
