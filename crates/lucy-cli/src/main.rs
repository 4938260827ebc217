//! `lucy`: batch deconvolution of an image directory.

mod backend;
mod batch;
mod cli;
mod config;
mod image_loader;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use backend::SelectedBackend;
use batch::BatchSummary;
use cli::Cli;
use config::RunConfig;

/// Exit status when configuration or input discovery fails.
const EXIT_USAGE: u8 = 2;
/// Exit status when at least one file failed.
const EXIT_FILE_FAILED: u8 = 1;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let summary = match run(&cli) {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(EXIT_USAGE);
        }
    };

    for (path, reason) in &summary.failed {
        tracing::error!("failed: {}: {reason}", path.display());
    }
    if summary.degraded > 0 {
        tracing::warn!("{} images used a rolled-back estimate", summary.degraded);
    }
    if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FILE_FAILED)
    }
}

/// Resolve configuration, find inputs, and process them all.
///
/// Errors here abort before any file is touched; per-file failures are
/// collected in the summary instead.
fn run(cli: &Cli) -> Result<BatchSummary, Box<dyn std::error::Error>> {
    let config = resolve_config(cli)?;
    let psf = config.psf.build()?;
    config.iterations.validate()?;

    let inputs: Vec<PathBuf> = batch::collect_inputs(&cli.input_dir)?;
    std::fs::create_dir_all(&cli.output_dir)?;

    tracing::info!(
        "{} images, PSF {}px sigma {}, {} iterations",
        inputs.len(),
        config.psf.size,
        config.psf.spread,
        config.iterations.iteration_count
    );

    let selected = backend::select(config.gpu);
    tracing::debug!("backend: {}", selected.name());

    let progress = ProgressBar::new(inputs.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let out = &cli.output_dir;
    let summary = match &selected {
        SelectedBackend::Cpu(cpu) => {
            batch::run_batch(&inputs, out, &psf, &config.iterations, cpu, &progress)
        }
        SelectedBackend::Gpu(gpu) => {
            batch::run_batch(&inputs, out, &psf, &config.iterations, gpu.as_ref(), &progress)
        }
    };
    Ok(summary)
}

fn resolve_config(cli: &Cli) -> Result<RunConfig, config::ConfigError> {
    let mut config = match &cli.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    config.apply(&cli.overrides())?;
    Ok(config)
}

/// Log level: `LUCY_LOG` if set and valid, else debug with `--verbose`, else info.
fn init_tracing(verbose: bool) {
    let level = std::env::var("LUCY_LOG")
        .ok()
        .and_then(|s| s.parse::<tracing::Level>().ok())
        .unwrap_or(if verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        });
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}
