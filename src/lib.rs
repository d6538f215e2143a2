#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Cutout
//!
//! An async background-removal pipeline built on Tract for inference and the
//! `image` crate for pixel work. Given the URL of a photograph, it fetches
//! and decodes the image, runs a segmentation model over it, composites the
//! predicted foreground probabilities into the alpha channel, and encodes
//! the result as a PNG behind a revocable [`ResultHandle`].
//!
//! The pipeline never surfaces a failure to the caller: any stage error is
//! logged and the handle falls back to the original locator so the caller
//! always has something to render.
//!
//! ## Features
//!
//! - **Pure Rust Inference**: Tract backend, no native ONNX Runtime needed
//! - **Model Management**: Automatic downloading and caching of models from `HuggingFace`
//! - **Shared Model**: One memoized backend per process, initialized on first use
//! - **Graceful Fallback**: Failed runs degrade to the source image, never to an error
//! - **Slot Semantics**: Per-surface [`Slot`]s guarantee last-request-wins rendering
//! - **Format Support**: JPEG, PNG, WebP, and TIFF sources; PNG output
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cutout::{HandleContent, ImageLocator, Pipeline, PipelineConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pipeline = Pipeline::new(PipelineConfig::default())?;
//! let handle = pipeline
//!     .process(&ImageLocator::new("https://example.com/portrait.jpg"))
//!     .await;
//!
//! match handle.content() {
//!     HandleContent::Processed(png) => tokio::fs::write("cutout.png", png).await?,
//!     HandleContent::Fallback(locator) => println!("rendering original {locator}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Driving a Rendering Surface
//!
//! When results feed a display element whose source can change while a run
//! is still in flight, wrap the pipeline in a [`Slot`]:
//!
//! ```rust,no_run
//! use cutout::{ImageLocator, Pipeline, PipelineConfig, Slot};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pipeline = Arc::new(Pipeline::new(PipelineConfig::default())?);
//! let slot = Slot::new(pipeline);
//!
//! slot.request(ImageLocator::new("https://example.com/a.jpg"));
//! // Superseding request: the first run is aborted and never rendered
//! slot.refresh(ImageLocator::new("https://example.com/b.jpg")).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `webp-support` (default): WebP source image decoding

pub mod backends;
pub mod compositor;
pub mod config;
pub mod download;
pub mod encoder;
pub mod error;
pub mod handle;
pub mod inference;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod segmentation;
pub mod slot;
pub mod types;

// Public API exports
pub use backends::TractBackend;
pub use compositor::composite;
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use download::{ModelAssets, ModelDownloader};
pub use encoder::encode_png;
pub use error::{CutoutError, Result};
pub use handle::{HandleContent, ResultHandle};
pub use inference::InferenceBackend;
pub use loader::{HttpFetcher, ImageFetcher, Loader};
pub use models::{shared_backend, ModelSource, ModelSpec, PreprocessingConfig, DEFAULT_MODEL_URL};
pub use pipeline::Pipeline;
pub use segmentation::Segmenter;
pub use slot::Slot;
pub use types::{ImageLocator, PipelineStage, SegmentationMask};

/// Remove the background from the image at a URL
///
/// One-shot convenience over [`Pipeline`]: builds a pipeline for the given
/// configuration, runs it once, and returns the handle. The model backend is
/// the process-wide shared one, so repeated calls pay the load cost only
/// once. Construction of the HTTP client is the only fallible step; the run
/// itself degrades to a fallback handle instead of erroring.
pub async fn remove_background_from_url(
    locator: &ImageLocator,
    config: &PipelineConfig,
) -> Result<ResultHandle> {
    let pipeline = Pipeline::new(config.clone())?;
    Ok(pipeline.process(locator).await)
}
