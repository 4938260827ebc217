//! End-to-end behavior of the deconvolution loop on synthetic images.

use lucy_core::convolution::{self, Boundary, ConvolutionMode};
use lucy_core::{
    CpuBackend, Image, IterationConfig, IteratorState, Plane, Psf, StabilizedIterator,
    Termination, process,
};

/// Bright square on a darker background.
fn square_ground_truth(size: u32) -> Plane {
    let lo = size / 3;
    let hi = 2 * size / 3;
    let mut data = Vec::with_capacity((size * size) as usize);
    for y in 0..size {
        for x in 0..size {
            let inside = (lo..hi).contains(&x) && (lo..hi).contains(&y);
            data.push(if inside { 0.8 } else { 0.2 });
        }
    }
    Plane::new(size, size, data).unwrap()
}

fn mean_abs_error(a: &Plane, b: &Plane) -> f64 {
    let total: f64 = a
        .data
        .iter()
        .zip(&b.data)
        .map(|(&x, &y)| f64::from((x - y).abs()))
        .sum();
    total / a.len() as f64
}

#[test]
fn test_uniform_image_scenario() {
    let image = Image::from_plane(Plane::filled(4, 4, 0.5));
    let psf = Psf::gaussian(3, 1.0).unwrap();
    let config = IterationConfig {
        iteration_count: 10,
        epsilon: 1e-3,
        clamp_low: 0.5,
        clamp_high: 2.0,
        smoothing_radius: 1,
        ..Default::default()
    };

    let restoration = process(&image, &psf, &config, &CpuBackend::new()).unwrap();
    let out = restoration.into_strict().unwrap();

    assert_eq!((out.width, out.height, out.channels), (4, 4, 1));
    for (i, v) in out.data.iter().enumerate() {
        assert!((0.0..=1.0).contains(v), "pixel {i} out of range: {v}");
        assert!((v - 0.5).abs() < 1e-2, "pixel {i}: {v}");
    }
}

#[test]
fn test_error_decreases_on_blurred_ground_truth() {
    let truth = square_ground_truth(24);
    let psf = Psf::gaussian(5, 1.5).unwrap();
    let observed =
        convolution::apply(&truth, &psf, ConvolutionMode::Forward, Boundary::Reflect);
    let image = Image::from_plane(observed);
    let backend = CpuBackend::new();

    let mut errors = Vec::new();
    for iteration_count in [1, 2, 4, 8] {
        let config = IterationConfig {
            iteration_count,
            epsilon: 1e-4,
            clamp_low: 0.5,
            clamp_high: 2.0,
            smoothing_radius: 1,
            ..Default::default()
        };
        let restored = process(&image, &psf, &config, &backend)
            .unwrap()
            .into_strict()
            .unwrap();
        let plane = restored.split_channels().remove(0);
        errors.push(mean_abs_error(&plane, &truth));
    }

    for pair in errors.windows(2) {
        assert!(pair[1] <= pair[0] + 1e-6, "error went up: {errors:?}");
    }
    assert!(errors[3] < errors[0], "no progress: {errors:?}");
}

#[test]
fn test_estimates_stay_bounded_near_zero_region() {
    // Left half almost black, right half near saturation.
    let (width, height) = (16, 12);
    let data = (0..height)
        .flat_map(|_| (0..width).map(move |x| if x < width / 2 { 1e-7 } else { 0.98 }))
        .collect();
    let observed = Plane::new(width, height, data).unwrap();
    let psf = Psf::gaussian(5, 2.0).unwrap();
    let backend = CpuBackend::new();
    let config = IterationConfig {
        iteration_count: 25,
        ..Default::default()
    };

    let mut iter = StabilizedIterator::new(&backend, observed, &psf, config).unwrap();
    loop {
        let state = iter.step().unwrap();
        let estimate = iter.estimate();
        assert!(estimate.is_finite(), "non-finite estimate in state {state:?}");
        assert!(
            estimate
                .data
                .iter()
                .all(|v| (config.valid_low..=config.valid_high).contains(v)),
            "estimate left the valid range in state {state:?}"
        );
        if let IteratorState::Terminated(reason) = state {
            assert_eq!(reason, Termination::Completed);
            break;
        }
    }
}

#[test]
fn test_zero_iterations_return_blurred_input() {
    let truth = square_ground_truth(12);
    let psf = Psf::gaussian(3, 1.0).unwrap();
    let config = IterationConfig {
        iteration_count: 0,
        ..Default::default()
    };

    let once = convolution::apply(&truth, &psf, ConvolutionMode::Forward, Boundary::Reflect);
    let twice = convolution::apply(&once, &psf, ConvolutionMode::Forward, Boundary::Reflect);

    let restored = process(&Image::from_plane(truth.clone()), &psf, &config, &CpuBackend::new())
        .unwrap()
        .into_strict()
        .unwrap();
    let plane = restored.split_channels().remove(0);

    assert_eq!(plane, once);
    assert_ne!(plane, truth);
    assert_ne!(plane, twice);
}

#[test]
fn test_zero_boundary_run_is_finite() {
    let truth = square_ground_truth(15);
    let psf = Psf::gaussian(5, 1.0).unwrap();
    let observed = convolution::apply(&truth, &psf, ConvolutionMode::Forward, Boundary::Zero);
    let config = IterationConfig {
        boundary: Boundary::Zero,
        ..Default::default()
    };
    let restoration =
        process(&Image::from_plane(observed), &psf, &config, &CpuBackend::new()).unwrap();
    assert!(!restoration.is_degraded());
    assert!(restoration.image.data.iter().all(|v| v.is_finite()));
}
