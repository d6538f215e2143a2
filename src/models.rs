//! Model specification, preprocessing configuration, and the process-wide
//! memoized inference backend
//!
//! The backend is expensive to build (download on first use, graph
//! optimization) and read-only afterwards, so it is shared across all
//! concurrent pipeline runs through a [`tokio::sync::OnceCell`]. A failed
//! initialization is not cached: the next caller retries from scratch.

use crate::backends::TractBackend;
use crate::config::PipelineConfig;
use crate::download::ModelDownloader;
use crate::error::{CutoutError, Result};
use crate::inference::InferenceBackend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Default segmentation model repository
pub const DEFAULT_MODEL_URL: &str = "https://huggingface.co/imgly/isnet-general-onnx";

/// Where the model weights come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// A `HuggingFace` repository URL, downloaded and cached on first use
    Url(String),
    /// A local `.onnx` file; `preprocessor_config.json` is looked up next
    /// to it and defaults are used when absent
    Path(PathBuf),
}

impl ModelSource {
    /// Human-readable name for logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Url(url) => ModelDownloader::url_to_model_id(url),
            Self::Path(path) => path.display().to_string(),
        }
    }
}

/// Specification of which model the pipeline runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    /// Model weights location
    pub source: ModelSource,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            source: ModelSource::Url(DEFAULT_MODEL_URL.to_string()),
        }
    }
}

/// Preprocessing parameters the model was trained with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Model input size as `[height, width]`
    pub target_size: [u32; 2],
    /// Per-channel normalization mean (RGB, 0-1 range)
    pub normalization_mean: [f32; 3],
    /// Per-channel normalization standard deviation (RGB, 0-1 range)
    pub normalization_std: [f32; 3],
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            target_size: [1024, 1024],
            normalization_mean: [0.485, 0.456, 0.406],
            normalization_std: [0.229, 0.224, 0.225],
        }
    }
}

/// `preprocessor_config.json` as `HuggingFace` image processors write it
#[derive(Debug, Deserialize)]
struct RawPreprocessorConfig {
    size: Option<RawSize>,
    image_mean: Option<Vec<f32>>,
    image_std: Option<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct RawSize {
    height: u32,
    width: u32,
}

impl PreprocessingConfig {
    /// Parse a `HuggingFace` `preprocessor_config.json` payload
    ///
    /// Missing fields fall back to the defaults; mean/std given in the
    /// 0-255 range are rescaled to 0-1.
    ///
    /// # Errors
    /// - `CutoutError::Inference` for malformed JSON or an invalid size
    pub fn parse(json: &str) -> Result<Self> {
        let raw: RawPreprocessorConfig = serde_json::from_str(json).map_err(|e| {
            CutoutError::inference(format!("malformed preprocessor config: {e}"))
        })?;

        let defaults = Self::default();

        let target_size = match raw.size {
            Some(size) => {
                if size.height == 0 || size.width == 0 {
                    return Err(CutoutError::inference(
                        "preprocessor config declares a zero-sized model input",
                    ));
                }
                [size.height, size.width]
            },
            None => defaults.target_size,
        };

        let normalization_mean =
            Self::channel_triple(raw.image_mean, defaults.normalization_mean, "image_mean")?;
        let normalization_std =
            Self::channel_triple(raw.image_std, defaults.normalization_std, "image_std")?;

        if normalization_std.iter().any(|&s| s <= 0.0) {
            return Err(CutoutError::inference(
                "preprocessor config declares a non-positive normalization std",
            ));
        }

        Ok(Self {
            target_size,
            normalization_mean,
            normalization_std,
        })
    }

    /// Read and parse a `preprocessor_config.json` file
    ///
    /// # Errors
    /// - `CutoutError::Io` if the file cannot be read
    /// - `CutoutError::Inference` if it cannot be parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| CutoutError::file_io_error("read preprocessor config", path, &e))?;
        Self::parse(&json)
    }

    fn channel_triple(
        values: Option<Vec<f32>>,
        fallback: [f32; 3],
        field: &str,
    ) -> Result<[f32; 3]> {
        let Some(values) = values else {
            return Ok(fallback);
        };
        let [Some(&a), Some(&b), Some(&c)] = [values.first(), values.get(1), values.get(2)] else {
            return Err(CutoutError::inference(format!(
                "preprocessor config field {field} must have 3 values"
            )));
        };
        // HuggingFace configs sometimes carry 0-255 values
        let rescale = |v: f32| if v > 1.0 { v / 255.0 } else { v };
        Ok([rescale(a), rescale(b), rescale(c)])
    }
}

/// Resolve a model spec to a weights path and preprocessing configuration,
/// downloading on first use for URL sources
async fn resolve_assets(spec: &ModelSpec) -> Result<(PathBuf, PreprocessingConfig)> {
    match &spec.source {
        ModelSource::Url(url) => {
            let downloader = ModelDownloader::new()?;
            let assets = downloader.ensure_cached(url).await?;
            let preprocessing = PreprocessingConfig::from_file(&assets.preprocessor_path)?;
            Ok((assets.model_path, preprocessing))
        },
        ModelSource::Path(path) => {
            if !path.is_file() {
                return Err(CutoutError::inference(format!(
                    "model file not found: {}",
                    path.display()
                )));
            }
            let sidecar = path
                .parent()
                .map(|dir| dir.join("preprocessor_config.json"))
                .filter(|p| p.is_file());
            let preprocessing = match sidecar {
                Some(p) => PreprocessingConfig::from_file(&p)?,
                None => {
                    log::debug!(
                        "No preprocessor config next to {}; using defaults",
                        path.display()
                    );
                    PreprocessingConfig::default()
                },
            };
            Ok((path.clone(), preprocessing))
        },
    }
}

static SHARED_BACKEND: OnceCell<Arc<dyn InferenceBackend>> = OnceCell::const_new();

/// Get the process-wide inference backend, initializing it on first call
///
/// The first caller suspends on model acquisition and graph optimization;
/// later callers reuse the same backend. The backend is built from the first
/// successfully initialized configuration; later calls with a different
/// `ModelSpec` still reuse it. Initialization failure is not cached, so the
/// next call retries.
///
/// # Errors
/// - `CutoutError::Inference` if the model cannot be acquired or loaded
pub async fn shared_backend(config: &PipelineConfig) -> Result<Arc<dyn InferenceBackend>> {
    SHARED_BACKEND
        .get_or_try_init(|| init_backend(config))
        .await
        .cloned()
}

async fn init_backend(config: &PipelineConfig) -> Result<Arc<dyn InferenceBackend>> {
    let (model_path, preprocessing) = resolve_assets(&config.model_spec).await?;
    let threads = config.inference_threads;

    // Graph loading and optimization are CPU-bound; keep them off the reactor
    let backend = tokio::task::spawn_blocking(move || {
        TractBackend::load(&model_path, preprocessing, threads)
    })
    .await
    .map_err(|e| CutoutError::inference(format!("model load task failed: {e}")))??;

    Ok(Arc::new(backend) as Arc<dyn InferenceBackend>)
}
