//! Compositor: apply a probability mask to source pixels
//!
//! A pure function of its inputs. The alpha channel is set straight from
//! the mask; RGB samples are copied from the source untouched, including
//! fully transparent pixels, so the output RGB plane is byte-identical to
//! the input.

use crate::error::{CutoutError, Result};
use crate::types::SegmentationMask;
use image::{DynamicImage, ImageBuffer, Rgba, RgbaImage};

/// Produce an RGBA image whose alpha channel encodes the mask
///
/// Per pixel: `alpha = clamp(round(mask * 255), 0, 255)`, RGB unchanged.
/// Alpha is monotonic non-decreasing in the mask value. No thresholding and
/// no feathering beyond what the mask itself encodes.
///
/// # Errors
/// - `CutoutError::DimensionMismatch` when image and mask dimensions
///   disagree. That is a programming-contract violation: the caller fed a
///   mask computed from a different image. No partial output is produced.
pub fn composite(image: &DynamicImage, mask: &SegmentationMask) -> Result<RgbaImage> {
    let image_dims = (image.width(), image.height());
    if mask.dimensions() != image_dims {
        return Err(CutoutError::DimensionMismatch {
            expected: image_dims,
            actual: mask.dimensions(),
        });
    }

    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut result = ImageBuffer::new(width, height);

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let probability = mask.get(x, y).unwrap_or(0.0);
        let alpha = (probability * 255.0).round().clamp(0.0, 255.0) as u8;
        result.put_pixel(x, y, Rgba([pixel[0], pixel[1], pixel[2], alpha]));
    }

    Ok(result)
}
