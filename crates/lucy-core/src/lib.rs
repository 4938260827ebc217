//! Lucy Core: stabilized Richardson–Lucy deconvolution engine.
//!
//! This crate contains the data model, PSF construction, the convolution
//! operator, the compute backend abstraction with its CPU implementation,
//! the per-channel iterator, and the channel processor. No GPU or codec
//! dependencies.

pub mod backend;
pub mod config;
pub mod convolution;
pub mod error;
pub mod image;
pub mod iterator;
pub mod processor;
pub mod psf;

// Re-exports for convenience.
pub use backend::{ComputeBackend, cpu::CpuBackend};
pub use config::{IterationConfig, PsfConfig};
pub use convolution::{Boundary, ConvolutionMode};
pub use error::{DeconvError, Result};
pub use image::{Image, Plane};
pub use iterator::{IterationOutcome, IteratorState, StabilizedIterator, Termination};
pub use processor::{ChannelReport, Restoration, process};
pub use psf::Psf;
