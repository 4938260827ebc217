//! Directory batch processing.

use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use lucy_core::{ComputeBackend, DeconvError, IterationConfig, Psf, Termination, process};

use crate::image_loader::{self, ImageLoadError};

/// Supported image files directly inside `dir`, sorted by file name.
pub fn collect_inputs(dir: &Path) -> Result<Vec<PathBuf>, BatchError> {
    if !dir.is_dir() {
        return Err(BatchError::NotADirectory(dir.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && image_loader::is_supported(&path) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    if files.is_empty() {
        return Err(BatchError::NoInputs(dir.to_path_buf()));
    }
    Ok(files)
}

/// Totals of one batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Files written.
    pub written: usize,
    /// Files written from a rolled-back estimate.
    pub degraded: usize,
    /// Files that could not be processed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Deconvolve every file in `inputs` into `output_dir` under the same name.
///
/// A failing file is recorded and the batch moves on.
pub fn run_batch<B: ComputeBackend>(
    inputs: &[PathBuf],
    output_dir: &Path,
    psf: &Psf,
    config: &IterationConfig,
    backend: &B,
    progress: &ProgressBar,
) -> BatchSummary {
    let mut summary = BatchSummary::default();

    for input in inputs {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        progress.set_message(name.clone());

        match process_file(input, &output_dir.join(&name), psf, config, backend) {
            Ok(degraded) => {
                summary.written += 1;
                if degraded {
                    summary.degraded += 1;
                }
            }
            Err(e) => {
                progress.suspend(|| tracing::error!("{name}: {e}"));
                summary.failed.push((input.clone(), e.to_string()));
            }
        }
        progress.inc(1);
    }

    progress.finish_with_message(format!(
        "{} written, {} failed",
        summary.written,
        summary.failed.len()
    ));
    summary
}

/// Returns true when the saved result came from a rolled-back channel.
fn process_file<B: ComputeBackend>(
    input: &Path,
    output: &Path,
    psf: &Psf,
    config: &IterationConfig,
    backend: &B,
) -> Result<bool, FileError> {
    let image = image_loader::load_image(input)?;
    let restoration = process(&image, psf, config, backend)?;

    for report in &restoration.channels {
        if let Termination::NumericalInstability { iteration } = report.termination {
            tracing::warn!(
                "{}: channel {} unstable at iteration {iteration}, kept iteration {}",
                input.display(),
                report.channel,
                report.iterations_completed
            );
        }
    }

    image_loader::save_image(output, &restoration.image)?;
    tracing::debug!("wrote {}", output.display());
    Ok(restoration.is_degraded())
}

/// Errors that stop a batch before any file is processed.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("input path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("no jpg, jpeg, png, tif or tiff files in {}", .0.display())]
    NoInputs(PathBuf),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors for a single file.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error(transparent)]
    Image(#[from] ImageLoadError),
    #[error("deconvolution failed: {0}")]
    Deconvolution(#[from] DeconvError),
}
