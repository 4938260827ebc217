//! Run configuration for the batch tool.
//!
//! Values are layered: built-in defaults (with `LUCY_GPU` from the
//! environment), then the optional JSON run file, then command-line flags.

use std::path::Path;
use std::str::FromStr;

use lucy_core::{Boundary, IterationConfig, PsfConfig};
use serde::{Deserialize, Serialize};

/// Which compute backend to run on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum GpuChoice {
    /// Request the GPU, falling back to the CPU with a warning.
    Yes,
    /// CPU only.
    No,
    /// GPU when an adapter exists, silently CPU otherwise.
    #[default]
    Auto,
}

impl FromStr for GpuChoice {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "true" | "1" | "on" => Ok(Self::Yes),
            "no" | "false" | "0" | "off" => Ok(Self::No),
            "auto" => Ok(Self::Auto),
            other => Err(ConfigError::InvalidValue {
                key: "gpu",
                value: other.to_string(),
            }),
        }
    }
}

/// Everything a batch run needs besides the directories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub psf: PsfConfig,
    pub iterations: IterationConfig,
    pub gpu: GpuChoice,
}

impl Default for RunConfig {
    fn default() -> Self {
        let gpu = match std::env::var("LUCY_GPU") {
            Ok(value) => value.parse().unwrap_or_else(|e| {
                tracing::warn!("ignoring LUCY_GPU: {e}");
                GpuChoice::Auto
            }),
            Err(_) => GpuChoice::Auto,
        };
        Self {
            psf: PsfConfig::default(),
            iterations: IterationConfig::default(),
            gpu,
        }
    }
}

/// Command-line values that replace config file values when present.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub iterations: Option<i64>,
    pub psf_size: Option<u32>,
    pub psf_sigma: Option<f64>,
    pub epsilon: Option<f32>,
    pub clamp_low: Option<f32>,
    pub clamp_high: Option<f32>,
    pub smoothing_radius: Option<u32>,
    pub boundary: Option<Boundary>,
    pub gpu: Option<GpuChoice>,
}

impl RunConfig {
    /// Read a JSON run file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Replace every field the command line set.
    pub fn apply(&mut self, overrides: &Overrides) -> Result<(), ConfigError> {
        if let Some(count) = overrides.iterations {
            self.iterations.iteration_count = IterationConfig::checked_iteration_count(count)?;
        }
        if let Some(size) = overrides.psf_size {
            self.psf.size = size;
        }
        if let Some(sigma) = overrides.psf_sigma {
            self.psf.spread = sigma;
        }
        if let Some(epsilon) = overrides.epsilon {
            self.iterations.epsilon = epsilon;
        }
        if let Some(low) = overrides.clamp_low {
            self.iterations.clamp_low = low;
        }
        if let Some(high) = overrides.clamp_high {
            self.iterations.clamp_high = high;
        }
        if let Some(radius) = overrides.smoothing_radius {
            self.iterations.smoothing_radius = radius;
        }
        if let Some(boundary) = overrides.boundary {
            self.iterations.boundary = boundary;
        }
        if let Some(gpu) = overrides.gpu {
            self.gpu = gpu;
        }
        Ok(())
    }
}

/// Errors from loading or merging the run configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid {key} value: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error(transparent)]
    Parameter(#[from] lucy_core::DeconvError),
}
