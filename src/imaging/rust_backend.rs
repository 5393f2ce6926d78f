//! Pure Rust codec backend on top of the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image::ImageReader` → RGBA f32 |
//! | Composite | straight-alpha "over", per-pixel, parallel via `rayon` |
//! | Encode | `image::DynamicImage::save_with_format`, format from extension |
//!
//! Pixels are held as `Rgba32FImage` behind an `Arc`, so handles are cheap to
//! pass between the pipeline and its caller.

use super::backend::{BackendError, ImageBackend};
use image::{DynamicImage, ImageFormat, ImageReader, Rgba32FImage};
use rayon::prelude::*;
use std::path::Path;
use std::sync::{Arc, LazyLock};

/// Extensions whose decoders are compiled in.
const PHOTO_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    PHOTO_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect()
});

/// Returns the set of image file extensions that have working decoders compiled in.
pub fn supported_input_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

/// True if `path` has one of the [`supported_input_extensions`].
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            supported_input_extensions()
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
}

/// Shared, immutable RGBA f32 pixels.
pub type Canvas = Arc<Rgba32FImage>;

#[derive(Debug, Default)]
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Blend one straight-alpha pixel over another, scaling the source alpha by
/// `weight`.
fn blend_over(dst: &mut [f32], src: &[f32], weight: f32) {
    let sa = src[3] * weight;
    let da = dst[3];
    let out_a = sa + da * (1.0 - sa);
    if out_a <= f32::EPSILON {
        dst.copy_from_slice(&[0.0, 0.0, 0.0, 0.0]);
        return;
    }
    for c in 0..3 {
        dst[c] = (src[c] * sa + dst[c] * da * (1.0 - sa)) / out_a;
    }
    dst[3] = out_a;
}

impl ImageBackend for RustBackend {
    type Image = Canvas;

    fn load(&self, path: &Path) -> Result<Canvas, BackendError> {
        let img = ImageReader::open(path)
            .map_err(BackendError::Io)?
            .with_guessed_format()
            .map_err(BackendError::Io)?
            .decode()
            .map_err(|e| {
                BackendError::ProcessingFailed(format!(
                    "Failed to decode {}: {}",
                    path.display(),
                    e
                ))
            })?;
        Ok(Arc::new(img.to_rgba32f()))
    }

    fn composite(&self, layers: &[(Canvas, f32)]) -> Result<Canvas, BackendError> {
        let (first, _) = layers
            .first()
            .ok_or_else(|| BackendError::ProcessingFailed("Nothing to composite".to_string()))?;
        let (width, height) = first.dimensions();
        let mut out = Rgba32FImage::new(width, height);

        for (layer, weight) in layers {
            if layer.dimensions() != (width, height) {
                return Err(BackendError::ProcessingFailed(format!(
                    "Layer is {}x{}, expected {}x{}",
                    layer.width(),
                    layer.height(),
                    width,
                    height
                )));
            }
            let dst: &mut [f32] = &mut out;
            dst.par_chunks_mut(4)
                .zip(layer.as_raw().par_chunks(4))
                .for_each(|(d, s)| blend_over(d, s, *weight));
        }
        Ok(Arc::new(out))
    }

    fn save(&self, image: &Canvas, path: &Path) -> Result<(), BackendError> {
        let format = ImageFormat::from_path(path).map_err(|e| {
            BackendError::ProcessingFailed(format!(
                "Unsupported output format {}: {}",
                path.display(),
                e
            ))
        })?;
        let dynamic = DynamicImage::ImageRgba32F(image.as_ref().clone());
        // JPEG has no alpha channel
        let encoded = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(dynamic.to_rgb8()),
            _ => DynamicImage::ImageRgba8(dynamic.to_rgba8()),
        };
        encoded
            .save_with_format(path, format)
            .map_err(|e| BackendError::ProcessingFailed(format!("Encode failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::write_png;
    use tempfile::TempDir;

    #[test]
    fn supported_extensions_match_decodable_formats() {
        let exts = supported_input_extensions();
        for expected in &["jpg", "jpeg", "png", "tif", "tiff", "webp"] {
            assert!(
                exts.contains(expected),
                "expected {expected} in supported extensions"
            );
        }
        assert!(is_supported_image(Path::new("a/B.PNG")));
        assert!(!is_supported_image(Path::new("notes.txt")));
    }

    #[test]
    fn load_nonexistent_file_errors() {
        let result = RustBackend::new().load(Path::new("/nonexistent/a.png"));
        assert!(matches!(result, Err(BackendError::Io(_))));
    }

    #[test]
    fn composite_full_weight_top_layer_wins() {
        let tmp = TempDir::new().unwrap();
        let red = tmp.path().join("red.png");
        let blue = tmp.path().join("blue.png");
        write_png(&red, 2, 2, [255, 0, 0, 255]);
        write_png(&blue, 2, 2, [0, 0, 255, 255]);

        let backend = RustBackend::new();
        let layers = vec![
            (backend.load(&red).unwrap(), 1.0),
            (backend.load(&blue).unwrap(), 1.0),
        ];
        let out = backend.composite(&layers).unwrap();
        let px = out.get_pixel(0, 0);
        assert_eq!(px.0, [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn composite_half_weight_blends() {
        let tmp = TempDir::new().unwrap();
        let black = tmp.path().join("black.png");
        let white = tmp.path().join("white.png");
        write_png(&black, 1, 1, [0, 0, 0, 255]);
        write_png(&white, 1, 1, [255, 255, 255, 255]);

        let backend = RustBackend::new();
        let out = backend
            .composite(&[
                (backend.load(&black).unwrap(), 1.0),
                (backend.load(&white).unwrap(), 0.5),
            ])
            .unwrap();
        let px = out.get_pixel(0, 0);
        assert!((px.0[0] - 0.5).abs() < 1e-4);
        assert!((px.0[3] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn composite_folds_one_layer_at_a_time() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.png");
        let b = tmp.path().join("b.png");
        write_png(&a, 1, 1, [200, 40, 0, 180]);
        write_png(&b, 1, 1, [10, 90, 250, 120]);

        let backend = RustBackend::new();
        let (la, lb) = (backend.load(&a).unwrap(), backend.load(&b).unwrap());
        let direct = backend
            .composite(&[(la.clone(), 0.8), (lb.clone(), 0.6)])
            .unwrap();
        let acc = backend.composite(&[(la, 0.8)]).unwrap();
        let folded = backend.composite(&[(acc, 1.0), (lb, 0.6)]).unwrap();

        for (x, y) in direct.get_pixel(0, 0).0.iter().zip(folded.get_pixel(0, 0).0) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn composite_dimension_mismatch_errors() {
        let tmp = TempDir::new().unwrap();
        let small = tmp.path().join("small.png");
        let large = tmp.path().join("large.png");
        write_png(&small, 2, 2, [0, 0, 0, 255]);
        write_png(&large, 3, 2, [0, 0, 0, 255]);

        let backend = RustBackend::new();
        let result = backend.composite(&[
            (backend.load(&small).unwrap(), 1.0),
            (backend.load(&large).unwrap(), 1.0),
        ]);
        assert!(matches!(result, Err(BackendError::ProcessingFailed(_))));
    }

    #[test]
    fn composite_empty_errors() {
        assert!(RustBackend::new().composite(&[]).is_err());
    }

    #[test]
    fn save_png_and_jpeg() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src.png");
        write_png(&src, 4, 3, [12, 34, 56, 255]);

        let backend = RustBackend::new();
        let img = backend.load(&src).unwrap();
        let png = tmp.path().join("out.png");
        let jpg = tmp.path().join("out.jpg");
        backend.save(&img, &png).unwrap();
        backend.save(&img, &jpg).unwrap();

        assert_eq!(image::image_dimensions(&png).unwrap(), (4, 3));
        assert_eq!(image::image_dimensions(&jpg).unwrap(), (4, 3));
    }

    #[test]
    fn save_unknown_extension_errors() {
        let tmp = TempDir::new().unwrap();
        let img = Arc::new(Rgba32FImage::new(1, 1));
        let result = RustBackend::new().save(&img, &tmp.path().join("out.xyz"));
        assert!(matches!(result, Err(BackendError::ProcessingFailed(_))));
    }
}
