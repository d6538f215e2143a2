//! Mock inference backends for tests
//!
//! These let the pipeline and slot machinery be exercised without model
//! files or a network. Outputs are deterministic functions of the input
//! shape, matching the determinism contract of real backends.

use crate::error::{CutoutError, Result};
use crate::inference::InferenceBackend;
use crate::models::PreprocessingConfig;
use ndarray::Array4;

/// What a [`MockBackend`] emits for each output pixel
#[derive(Debug, Clone, Copy)]
enum MockPattern {
    /// Horizontal gradient from 0 at the left edge to 1 at the right
    Gradient,
    /// A constant probability everywhere
    Constant(f32),
}

/// Deterministic in-memory backend
pub(crate) struct MockBackend {
    preprocessing: PreprocessingConfig,
    pattern: MockPattern,
    fail: bool,
}

impl MockBackend {
    /// Gradient-mask backend with a square `size`x`size` model input
    pub(crate) fn new(size: u32) -> Self {
        Self {
            preprocessing: PreprocessingConfig {
                target_size: [size, size],
                ..PreprocessingConfig::default()
            },
            pattern: MockPattern::Gradient,
            fail: false,
        }
    }

    /// Backend emitting `value` for every pixel
    pub(crate) fn constant(value: f32, size: u32) -> Self {
        Self {
            pattern: MockPattern::Constant(value),
            ..Self::new(size)
        }
    }

    /// Backend whose `infer` always fails
    pub(crate) fn new_failing(size: u32) -> Self {
        Self {
            fail: true,
            ..Self::new(size)
        }
    }
}

impl InferenceBackend for MockBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        if self.fail {
            return Err(CutoutError::inference("mock backend configured to fail"));
        }

        let shape = input.shape();
        let (height, width) = (
            shape.get(2).copied().unwrap_or(0),
            shape.get(3).copied().unwrap_or(0),
        );

        let output = Array4::from_shape_fn((1, 1, height, width), |(_, _, _, x)| {
            match self.pattern {
                MockPattern::Gradient => {
                    if width > 1 {
                        x as f32 / (width - 1) as f32
                    } else {
                        1.0
                    }
                },
                MockPattern::Constant(value) => value,
            }
        });

        Ok(output)
    }

    fn preprocessing_config(&self) -> &PreprocessingConfig {
        &self.preprocessing
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient_pattern() {
        let backend = MockBackend::new(4);
        let input = Array4::<f32>::zeros((1, 3, 4, 4));
        let output = backend.infer(&input).unwrap();

        assert!(output[[0, 0, 0, 0]].abs() < f32::EPSILON);
        assert!((output[[0, 0, 3, 3]] - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_constant_pattern() {
        let backend = MockBackend::constant(0.25, 4);
        let input = Array4::<f32>::zeros((1, 3, 4, 4));
        let output = backend.infer(&input).unwrap();
        assert!(output.iter().all(|&v| (v - 0.25).abs() < f32::EPSILON));
    }

    #[test]
    fn test_failing_backend() {
        let backend = MockBackend::new_failing(4);
        let input = Array4::<f32>::zeros((1, 3, 4, 4));
        assert!(matches!(
            backend.infer(&input),
            Err(CutoutError::Inference(_))
        ));
    }
}
