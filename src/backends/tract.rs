//! Tract backend: pure Rust ONNX inference
//!
//! Tract keeps the whole pipeline free of C++ dependencies and FFI
//! boundaries, and its inference is deterministic, which the pipeline's
//! idempotence guarantee leans on.

use crate::error::{CutoutError, Result};
use crate::inference::InferenceBackend;
use crate::models::PreprocessingConfig;
use ndarray::Array4;
use std::path::Path;
use std::time::Instant;
use tract_onnx::prelude::*;

/// Alias for the optimized runnable model type
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Segmentation backend running an ONNX graph through Tract
#[derive(Debug)]
pub struct TractBackend {
    model: TractModel,
    preprocessing: PreprocessingConfig,
}

impl TractBackend {
    /// Load and optimize an ONNX model from disk
    ///
    /// `threads` is accepted for configuration symmetry but ignored: Tract
    /// executes one inference on the calling thread.
    ///
    /// # Errors
    /// - `CutoutError::Inference` if the graph cannot be read, optimized,
    ///   or made runnable
    pub fn load(
        model_path: &Path,
        preprocessing: PreprocessingConfig,
        threads: usize,
    ) -> Result<Self> {
        let load_start = Instant::now();

        if threads > 0 {
            log::debug!("Tract runs one inference per thread; thread hint {threads} ignored");
        }

        let model_data = std::fs::read(model_path)
            .map_err(|e| CutoutError::file_io_error("read model file", model_path, &e))?;

        log::info!(
            "Loading segmentation model from {} ({:.2} MB)",
            model_path.display(),
            model_data.len() as f64 / (1024.0 * 1024.0)
        );

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| CutoutError::inference(format!("failed to load ONNX model: {e}")))?
            .into_optimized()
            .map_err(|e| CutoutError::inference(format!("failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| CutoutError::inference(format!("failed to create runnable model: {e}")))?;

        log::info!(
            "Segmentation model ready in {:.2}ms (input {}x{})",
            load_start.elapsed().as_millis(),
            preprocessing.target_size[1],
            preprocessing.target_size[0],
        );

        Ok(Self {
            model,
            preprocessing,
        })
    }
}

impl InferenceBackend for TractBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let inference_start = Instant::now();
        log::debug!("Running Tract inference on tensor {:?}", input.shape());

        let input_tensor = Tensor::from(input.clone());
        let outputs = self
            .model
            .run(tvec![input_tensor.into()])
            .map_err(|e| CutoutError::inference(format!("Tract inference failed: {e}")))?;

        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| CutoutError::inference("model produced no output tensor"))?
            .into_arc_tensor();

        let output_view = output_tensor.to_array_view::<f32>().map_err(|e| {
            CutoutError::inference(format!("failed to read output tensor: {e}"))
        })?;

        let shape = output_view.shape();
        if shape.len() != 4 {
            return Err(CutoutError::inference(format!(
                "expected 4D output tensor, got {}D",
                shape.len()
            )));
        }

        let dims = (
            shape.first().copied().unwrap_or(0),
            shape.get(1).copied().unwrap_or(0),
            shape.get(2).copied().unwrap_or(0),
            shape.get(3).copied().unwrap_or(0),
        );
        let output = Array4::from_shape_vec(dims, output_view.to_owned().into_raw_vec_and_offset().0)
            .map_err(|e| CutoutError::inference(format!("failed to reshape output tensor: {e}")))?;

        log::debug!(
            "Tract inference completed in {:.2}ms, output {:?}",
            inference_start.elapsed().as_millis(),
            output.shape()
        );

        Ok(output)
    }

    fn preprocessing_config(&self) -> &PreprocessingConfig {
        &self.preprocessing
    }

    fn name(&self) -> &'static str {
        "tract"
    }
}
