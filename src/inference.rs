//! Inference backend abstraction
//!
//! The pipeline only ever sees this trait; the concrete Tract backend lives
//! in [`crate::backends`]. Implementations must be shareable across
//! concurrent runs: the model is read-only once loaded, so `infer` takes
//! `&self`.

use crate::error::Result;
use crate::models::PreprocessingConfig;
use ndarray::Array4;

/// A loaded segmentation model
///
/// Determinism contract: for a fixed model and fixed input tensor, `infer`
/// must return the same output on repeated calls. Failure must be reported
/// as an error, never as a fabricated all-zero or all-one output.
pub trait InferenceBackend: Send + Sync {
    /// Run the model over an NCHW `(1, 3, H, W)` tensor, returning a
    /// `(1, 1, H, W)` foreground-probability tensor
    ///
    /// # Errors
    /// - Model runtime failures
    /// - Unexpected output tensor rank or shape
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Preprocessing parameters the model expects its input to follow
    fn preprocessing_config(&self) -> &PreprocessingConfig;

    /// Short backend name for log fields
    fn name(&self) -> &'static str;
}
