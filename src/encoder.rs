//! Encoder: composited RGBA buffer -> distributable image bytes
//!
//! PNG only. The transparency produced by the compositor must survive
//! serialization exactly, which rules out any lossy or alpha-less
//! container.

use crate::error::{CutoutError, Result};
use image::RgbaImage;
use std::io::Cursor;

/// Serialize an RGBA buffer as PNG
///
/// # Errors
/// - `CutoutError::Encode` for a zero-sized buffer or an encoder failure
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(CutoutError::encode(format!(
            "cannot encode zero-sized image ({width}x{height})"
        )));
    }

    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
        .map_err(|e| CutoutError::encode(format!("PNG encoding failed: {e}")))?;

    log::debug!("Encoded {width}x{height} RGBA image to {} PNG bytes", buffer.len());
    Ok(buffer)
}
