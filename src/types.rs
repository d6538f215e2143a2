//! Core types for the background removal pipeline

use crate::error::{CutoutError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque reference to a source image, a URL in practice
///
/// Immutable and cheap to clone; supplied by the caller and only ever
/// dereferenced by the Source Loader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageLocator(String);

impl ImageLocator {
    /// Wrap a locator string
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self(url.into())
    }

    /// The underlying URL string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageLocator {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<String> for ImageLocator {
    fn from(url: String) -> Self {
        Self(url)
    }
}

/// Per-pixel foreground probability mask
///
/// Values are probabilities in `[0,1]`, row-major, one per pixel. The engine
/// applies no thresholding; softness is the compositor's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationMask {
    data: Vec<f32>,
    width: u32,
    height: u32,
}

impl SegmentationMask {
    /// Create a mask from probability data
    ///
    /// # Errors
    /// Returns `CutoutError::Inference` if `data.len()` disagrees with the
    /// dimensions.
    pub fn new(data: Vec<f32>, width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(CutoutError::inference(format!(
                "mask has {} values but dimensions {}x{} require {}",
                data.len(),
                width,
                height,
                expected
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Create a mask filled with a single probability, clamped to `[0,1]`
    #[must_use]
    pub fn filled(value: f32, width: u32, height: u32) -> Self {
        let value = value.clamp(0.0, 1.0);
        Self {
            data: vec![value; width as usize * height as usize],
            width,
            height,
        }
    }

    /// Mask dimensions as `(width, height)`
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Probability at `(x, y)`, or `None` out of bounds
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Raw probability values, row-major
    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.data
    }

    /// Fraction of pixels with probability above 0.5; a cheap diagnostic
    #[must_use]
    pub fn foreground_ratio(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let fg = self.data.iter().filter(|&&v| v > 0.5).count();
        fg as f32 / self.data.len() as f32
    }
}

/// Stages of one pipeline invocation
///
/// A run moves strictly forward through these; `Succeeded` and `Failed` are
/// terminal and no stage is entered twice within one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    /// No work started yet
    Idle,
    /// Fetching and decoding the source image
    Loading,
    /// Running segmentation inference
    Segmenting,
    /// Applying the mask to the source pixels
    Compositing,
    /// Serializing the composited buffer
    Encoding,
    /// Terminal: a processed handle was produced
    Succeeded,
    /// Terminal: the run fell back to the original image
    Failed,
}

impl PipelineStage {
    /// Stage name as it appears in log fields
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Segmenting => "segmenting",
            Self::Compositing => "compositing",
            Self::Encoding => "encoding",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// True for `Succeeded` and `Failed`
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}
