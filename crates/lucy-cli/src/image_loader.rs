//! Image loading and saving for the batch tool.

use std::path::Path;

use lucy_core::Image;

/// File extensions picked up from the input directory (compared lowercase).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff"];

/// True when `path` has one of the [`SUPPORTED_EXTENSIONS`].
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Load an image from disk as 3-channel RGB `f32` in `[0, 1]`.
///
/// Grayscale sources are expanded to three equal channels and alpha is
/// dropped. Higher bit depths are scaled by their own maximum.
pub fn load_image(path: &Path) -> Result<Image, ImageLoadError> {
    let img = image::open(path).map_err(ImageLoadError::Decode)?;
    let rgb = img.to_rgb32f();
    let (width, height) = rgb.dimensions();
    Ok(Image::new(width, height, 3, rgb.into_raw())?)
}

/// Save a 3-channel image as 8-bit RGB. The format follows the file extension.
///
/// Samples are clipped to `[0, 1]` and rounded to the nearest level.
pub fn save_image(path: &Path, image: &Image) -> Result<(), ImageLoadError> {
    if image.channels != 3 {
        return Err(ImageLoadError::Channels(image.channels));
    }
    let bytes: Vec<u8> = image.data.iter().map(|&v| quantize(v)).collect();
    let rgb = image::RgbImage::from_raw(image.width, image.height, bytes)
        .ok_or(ImageLoadError::Channels(image.channels))?;
    rgb.save(path).map_err(ImageLoadError::Encode)
}

fn quantize(v: f32) -> u8 {
    // NaN saturates to 0 in the cast.
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Errors that can occur during image loading and saving.
#[derive(Debug, thiserror::Error)]
pub enum ImageLoadError {
    #[error("failed to decode image: {0}")]
    Decode(image::ImageError),
    #[error("failed to encode image: {0}")]
    Encode(image::ImageError),
    #[error("expected 3 channels, got {0}")]
    Channels(usize),
    #[error(transparent)]
    Layout(#[from] lucy_core::DeconvError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_extensions_ignore_case() {
        assert!(is_supported(Path::new("a/photo.JPG")));
        assert!(is_supported(Path::new("scan.tiff")));
        assert!(is_supported(Path::new("x.Png")));
        assert!(!is_supported(Path::new("notes.txt")));
        assert!(!is_supported(Path::new("no_extension")));
    }

    #[test]
    fn test_quantize_clips_and_rounds() {
        assert_eq!(quantize(-0.5), 0);
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(0.5), 128);
        assert_eq!(quantize(1.0), 255);
        assert_eq!(quantize(3.0), 255);
        assert_eq!(quantize(f32::NAN), 0);
    }

    #[test]
    fn test_png_roundtrip_is_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roundtrip.png");
        let data: Vec<f32> = (0..4 * 3 * 3).map(|i| (i * 7 % 256) as f32 / 255.0).collect();
        let image = Image::new(4, 3, 3, data.clone()).unwrap();

        save_image(&path, &image).unwrap();
        let loaded = load_image(&path).unwrap();

        assert_eq!((loaded.width, loaded.height, loaded.channels), (4, 3, 3));
        for (a, b) in loaded.data.iter().zip(&data) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
    }

    #[test]
    fn test_grayscale_and_alpha_become_rgb() {
        let dir = tempfile::tempdir().unwrap();

        let gray_path = dir.path().join("gray.png");
        image::GrayImage::from_pixel(2, 2, image::Luma([51]))
            .save(&gray_path)
            .unwrap();
        let gray = load_image(&gray_path).unwrap();
        assert_eq!(gray.channels, 3);
        assert!(gray.data.iter().all(|v| (v - 0.2).abs() < 1e-6));

        let rgba_path = dir.path().join("rgba.png");
        image::RgbaImage::from_pixel(2, 1, image::Rgba([255, 0, 102, 10]))
            .save(&rgba_path)
            .unwrap();
        let rgba = load_image(&rgba_path).unwrap();
        assert_eq!(rgba.channels, 3);
        assert_eq!(rgba.data.len(), 6);
        assert!((rgba.data[0] - 1.0).abs() < 1e-6);
        assert_eq!(rgba.data[1], 0.0);
        assert!((rgba.data[2] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_save_rejects_single_channel() {
        let dir = tempfile::tempdir().unwrap();
        let image = Image::new(2, 2, 1, vec![0.0; 4]).unwrap();
        assert!(matches!(
            save_image(&dir.path().join("x.png"), &image),
            Err(ImageLoadError::Channels(1))
        ));
    }

    #[test]
    fn test_missing_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_image(&dir.path().join("missing.png")),
            Err(ImageLoadError::Decode(_))
        ));
    }
}
