//! Segmentation Engine: decoded image -> per-pixel foreground probabilities
//!
//! The source image is letterboxed into the model's input resolution,
//! normalized into an NCHW tensor, run through the backend off the async
//! reactor, and the model-resolution mask is mapped back to source
//! resolution with bilinear sampling so edges stay smooth instead of blocky.

use crate::error::{CutoutError, Result};
use crate::inference::InferenceBackend;
use crate::models::PreprocessingConfig;
use crate::types::SegmentationMask;
use image::{DynamicImage, ImageBuffer};
use ndarray::Array4;
use std::sync::Arc;

/// Letterbox color for the regions outside the scaled image
const PADDING: [u8; 3] = [255, 255, 255];

/// Geometry of one letterboxed preprocessing pass, kept so the output mask
/// can be mapped back onto source coordinates
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    /// Source-to-model scale factor (uniform, aspect preserving)
    scale: f32,
    /// Horizontal offset of the scaled image inside the model canvas
    offset_x: u32,
    /// Vertical offset of the scaled image inside the model canvas
    offset_y: u32,
    /// Scaled image width inside the canvas
    scaled_width: u32,
    /// Scaled image height inside the canvas
    scaled_height: u32,
}

impl Letterbox {
    fn compute(orig_width: u32, orig_height: u32, target: [u32; 2]) -> Self {
        let [target_h, target_w] = target;
        let scale = (target_w as f32 / orig_width as f32)
            .min(target_h as f32 / orig_height as f32);

        let scaled_width = ((orig_width as f32 * scale).round() as u32).clamp(1, target_w);
        let scaled_height = ((orig_height as f32 * scale).round() as u32).clamp(1, target_h);

        Self {
            scale,
            offset_x: (target_w - scaled_width) / 2,
            offset_y: (target_h - scaled_height) / 2,
            scaled_width,
            scaled_height,
        }
    }
}

/// Runs segmentation inference over decoded images
pub struct Segmenter {
    backend: Arc<dyn InferenceBackend>,
}

impl Segmenter {
    /// Create a segmenter over a loaded backend
    #[must_use]
    pub fn new(backend: Arc<dyn InferenceBackend>) -> Self {
        Self { backend }
    }

    /// Compute the foreground-probability mask for an image
    ///
    /// The returned mask has exactly the image's dimensions. Values are
    /// probabilities in `[0,1]`; no thresholding is applied here.
    ///
    /// # Errors
    /// - `CutoutError::Inference` for model runtime failures or unexpected
    ///   output shapes
    pub async fn segment(&self, image: &DynamicImage) -> Result<SegmentationMask> {
        let (orig_width, orig_height) = (image.width(), image.height());
        let preprocessing = self.backend.preprocessing_config().clone();
        let letterbox = Letterbox::compute(orig_width, orig_height, preprocessing.target_size);

        let tensor = preprocess(image, &preprocessing, letterbox);

        // Inference is CPU-heavy and synchronous; keep it off the reactor
        let backend = Arc::clone(&self.backend);
        let output = tokio::task::spawn_blocking(move || backend.infer(&tensor))
            .await
            .map_err(|e| CutoutError::inference(format!("inference task failed: {e}")))??;

        mask_from_tensor(&output, (orig_width, orig_height), letterbox)
    }

    /// Backend name, for log fields
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }
}

/// Letterbox the image into the model canvas and normalize it into an
/// NCHW `(1, 3, H, W)` tensor
fn preprocess(
    image: &DynamicImage,
    config: &PreprocessingConfig,
    letterbox: Letterbox,
) -> Array4<f32> {
    let [target_h, target_w] = config.target_size;
    let rgb_image = image.to_rgb8();

    let resized = image::imageops::resize(
        &rgb_image,
        letterbox.scaled_width,
        letterbox.scaled_height,
        image::imageops::FilterType::Triangle,
    );

    let mut canvas = ImageBuffer::from_pixel(target_w, target_h, image::Rgb(PADDING));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let canvas_x = x + letterbox.offset_x;
        let canvas_y = y + letterbox.offset_y;
        if canvas_x < target_w && canvas_y < target_h {
            canvas.put_pixel(canvas_x, canvas_y, *pixel);
        }
    }

    let mut tensor = Array4::<f32>::zeros((1, 3, target_h as usize, target_w as usize));
    #[allow(clippy::indexing_slicing)] // tensor pre-allocated to canvas size
    for (y, row) in canvas.rows().enumerate() {
        for (x, pixel) in row.enumerate() {
            for channel in 0..3 {
                let normalized = (f32::from(pixel[channel]) / 255.0
                    - config.normalization_mean[channel])
                    / config.normalization_std[channel];
                tensor[[0, channel, y, x]] = normalized;
            }
        }
    }

    tensor
}

/// Map the model-resolution output tensor back onto source coordinates
fn mask_from_tensor(
    tensor: &Array4<f32>,
    original_dimensions: (u32, u32),
    letterbox: Letterbox,
) -> Result<SegmentationMask> {
    let shape = tensor.shape();
    if shape.first().copied().unwrap_or(0) != 1 || shape.get(1).copied().unwrap_or(0) != 1 {
        return Err(CutoutError::inference(format!(
            "expected (1, 1, H, W) output tensor, got {shape:?}"
        )));
    }

    let (orig_width, orig_height) = original_dimensions;
    let mut data = Vec::with_capacity(orig_width as usize * orig_height as usize);

    for y in 0..orig_height {
        for x in 0..orig_width {
            // Map the source pixel center into tensor coordinates
            let fx = (x as f32 + 0.5) * letterbox.scale - 0.5 + letterbox.offset_x as f32;
            let fy = (y as f32 + 0.5) * letterbox.scale - 0.5 + letterbox.offset_y as f32;
            data.push(sample_bilinear(tensor, fx, fy, letterbox).clamp(0.0, 1.0));
        }
    }

    SegmentationMask::new(data, orig_width, orig_height)
}

/// Bilinear sample inside the letterboxed content region; coordinates are
/// clamped to the region so padding never bleeds into the mask
fn sample_bilinear(tensor: &Array4<f32>, fx: f32, fy: f32, letterbox: Letterbox) -> f32 {
    let min_x = letterbox.offset_x as f32;
    let min_y = letterbox.offset_y as f32;
    let max_x = (letterbox.offset_x + letterbox.scaled_width - 1) as f32;
    let max_y = (letterbox.offset_y + letterbox.scaled_height - 1) as f32;

    let fx = fx.clamp(min_x, max_x);
    let fy = fy.clamp(min_y, max_y);

    let x0 = fx.floor();
    let y0 = fy.floor();
    let x1 = (x0 + 1.0).min(max_x);
    let y1 = (y0 + 1.0).min(max_y);
    let wx = fx - x0;
    let wy = fy - y0;

    let at = |x: f32, y: f32| -> f32 {
        tensor
            .get([0, 0, y as usize, x as usize])
            .copied()
            .unwrap_or(0.0)
    };

    let top = at(x0, y0) * (1.0 - wx) + at(x1, y0) * wx;
    let bottom = at(x0, y1) * (1.0 - wx) + at(x1, y1) * wx;
    top * (1.0 - wy) + bottom * wy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockBackend;
    use image::{ImageBuffer, Rgb};

    fn test_image(width: u32, height: u32) -> DynamicImage {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(width, height, Rgb([120, 80, 40]));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_letterbox_square_source() {
        let lb = Letterbox::compute(100, 100, [64, 64]);
        assert_eq!(lb.scaled_width, 64);
        assert_eq!(lb.scaled_height, 64);
        assert_eq!((lb.offset_x, lb.offset_y), (0, 0));
    }

    #[test]
    fn test_letterbox_wide_source_is_centered_vertically() {
        let lb = Letterbox::compute(200, 100, [64, 64]);
        assert_eq!(lb.scaled_width, 64);
        assert_eq!(lb.scaled_height, 32);
        assert_eq!(lb.offset_x, 0);
        assert_eq!(lb.offset_y, 16);
    }

    #[test]
    fn test_preprocess_tensor_shape_and_normalization() {
        let image = test_image(10, 10);
        let config = PreprocessingConfig {
            target_size: [8, 8],
            normalization_mean: [0.0, 0.0, 0.0],
            normalization_std: [1.0, 1.0, 1.0],
        };
        let lb = Letterbox::compute(10, 10, config.target_size);
        let tensor = preprocess(&image, &config, lb);

        assert_eq!(tensor.shape(), &[1, 3, 8, 8]);
        // Identity normalization: red channel of the uniform image is 120/255
        assert!((tensor[[0, 0, 4, 4]] - 120.0 / 255.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_segment_mask_matches_source_dimensions() {
        let segmenter = Segmenter::new(Arc::new(MockBackend::new(16)));
        let mask = segmenter.segment(&test_image(33, 21)).await.unwrap();
        assert_eq!(mask.dimensions(), (33, 21));
        assert!(mask.values().iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[tokio::test]
    async fn test_segment_constant_backend_yields_constant_mask() {
        let segmenter = Segmenter::new(Arc::new(MockBackend::constant(0.6, 16)));
        let mask = segmenter.segment(&test_image(20, 20)).await.unwrap();
        assert!(mask.values().iter().all(|&v| (v - 0.6).abs() < 1e-4));
    }

    #[tokio::test]
    async fn test_segment_gradient_stays_monotone_after_upsampling() {
        let segmenter = Segmenter::new(Arc::new(MockBackend::new(16)));
        let mask = segmenter.segment(&test_image(40, 10)).await.unwrap();

        // The mock emits a left-to-right gradient; bilinear upsampling must
        // preserve horizontal monotonicity on every row
        for y in 0..10 {
            let mut prev = -1.0f32;
            for x in 0..40 {
                let v = mask.get(x, y).unwrap();
                assert!(v >= prev - 1e-5, "row {y} not monotone at x={x}");
                prev = v;
            }
        }
    }

    #[tokio::test]
    async fn test_segment_deterministic() {
        let segmenter = Segmenter::new(Arc::new(MockBackend::new(16)));
        let image = test_image(17, 23);
        let first = segmenter.segment(&image).await.unwrap();
        let second = segmenter.segment(&image).await.unwrap();
        assert_eq!(first.values(), second.values());
    }

    #[tokio::test]
    async fn test_segment_surfaces_backend_failure() {
        let segmenter = Segmenter::new(Arc::new(MockBackend::new_failing(16)));
        let err = segmenter.segment(&test_image(8, 8)).await.unwrap_err();
        assert!(matches!(err, CutoutError::Inference(_)));
    }

    #[test]
    fn test_mask_from_tensor_rejects_bad_rank() {
        let tensor = Array4::<f32>::zeros((1, 3, 8, 8));
        let lb = Letterbox::compute(8, 8, [8, 8]);
        let err = mask_from_tensor(&tensor, (8, 8), lb).unwrap_err();
        assert!(matches!(err, CutoutError::Inference(_)));
    }
}
