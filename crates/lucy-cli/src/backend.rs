//! Backend selection with CPU fallback.

use lucy_core::CpuBackend;
use lucy_gpu::GpuBackend;

use crate::config::GpuChoice;

/// The backend a run executes on.
pub enum SelectedBackend {
    Cpu(CpuBackend),
    Gpu(Box<GpuBackend>),
}

impl SelectedBackend {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cpu(_) => "cpu",
            Self::Gpu(_) => "gpu",
        }
    }
}

/// Resolve `choice` to a concrete backend. Never fails: a missing GPU
/// falls back to the CPU, with a warning when the GPU was requested.
pub fn select(choice: GpuChoice) -> SelectedBackend {
    select_with(choice, GpuBackend::create_blocking)
}

fn select_with(
    choice: GpuChoice,
    create_gpu: impl FnOnce() -> lucy_core::Result<GpuBackend>,
) -> SelectedBackend {
    if choice == GpuChoice::No {
        tracing::info!("using CPU backend");
        return SelectedBackend::Cpu(CpuBackend::new());
    }
    match create_gpu() {
        Ok(gpu) => {
            tracing::info!("using GPU backend");
            SelectedBackend::Gpu(Box::new(gpu))
        }
        Err(e) => {
            if choice == GpuChoice::Yes {
                tracing::warn!("GPU requested but unavailable ({e}); falling back to CPU");
            } else {
                tracing::info!("no GPU available ({e}); using CPU backend");
            }
            SelectedBackend::Cpu(CpuBackend::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lucy_core::DeconvError;

    fn unavailable() -> lucy_core::Result<GpuBackend> {
        Err(DeconvError::BackendUnavailable("no adapter".into()))
    }

    #[test]
    fn test_no_never_touches_the_gpu() {
        let selected = select_with(GpuChoice::No, || panic!("GPU must not be requested"));
        assert_eq!(selected.name(), "cpu");
    }

    #[test]
    fn test_missing_gpu_falls_back_to_cpu() {
        assert_eq!(select_with(GpuChoice::Yes, unavailable).name(), "cpu");
        assert_eq!(select_with(GpuChoice::Auto, unavailable).name(), "cpu");
    }
}
