//! Pipeline Orchestrator
//!
//! Sequences load -> segment -> composite -> encode for one request, owns
//! the failure policy, and is the only entry point external callers use.
//! Errors never escape to a rendering surface: [`Pipeline::process`]
//! resolves to a fallback handle referencing the original locator and the
//! error goes to the log instead.

use crate::compositor::composite;
use crate::config::PipelineConfig;
use crate::encoder::encode_png;
use crate::error::Result;
use crate::handle::ResultHandle;
use crate::inference::InferenceBackend;
use crate::loader::{HttpFetcher, ImageFetcher, Loader};
use crate::models::shared_backend;
use crate::segmentation::Segmenter;
use crate::types::{ImageLocator, PipelineStage};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, span, warn, Instrument, Level};

/// Background-removal pipeline
///
/// Cheap to share behind an `Arc`; one instance serves any number of
/// concurrent runs. The inference backend is resolved lazily on the first
/// run and memoized process-wide.
pub struct Pipeline {
    config: PipelineConfig,
    loader: Loader,
    backend_override: Option<Arc<dyn InferenceBackend>>,
}

impl Pipeline {
    /// Create a pipeline fetching over HTTP and using the configured model
    ///
    /// # Errors
    /// - `CutoutError::Fetch` if the HTTP client cannot be constructed
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config)?);
        Ok(Self {
            config,
            loader: Loader::new(fetcher),
            backend_override: None,
        })
    }

    /// Create a pipeline with an injected fetcher and backend
    ///
    /// This is the seam tests and embedders with custom transports use; the
    /// process-wide memoized model is bypassed entirely.
    #[must_use]
    pub fn with_components(
        config: PipelineConfig,
        fetcher: Arc<dyn ImageFetcher>,
        backend: Arc<dyn InferenceBackend>,
    ) -> Self {
        Self {
            config,
            loader: Loader::new(fetcher),
            backend_override: Some(backend),
        }
    }

    /// The configuration this pipeline runs with
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    async fn backend(&self) -> Result<Arc<dyn InferenceBackend>> {
        match &self.backend_override {
            Some(backend) => Ok(Arc::clone(backend)),
            None => shared_backend(&self.config).await,
        }
    }

    /// Process a locator, falling back to the original image on any failure
    ///
    /// This is the operation UI callers use. It never fails: every stage
    /// error is logged and absorbed into a fallback handle that references
    /// the unprocessed original. `handle.is_processed()` distinguishes the
    /// two outcomes.
    pub async fn process(&self, locator: &ImageLocator) -> ResultHandle {
        let total_start = Instant::now();
        match self.try_process(locator).await {
            Ok(handle) => {
                info!(
                    locator = %locator,
                    elapsed_ms = total_start.elapsed().as_millis() as u64,
                    "background removal succeeded"
                );
                handle
            },
            Err(e) => {
                if e.is_contract_violation() {
                    error!(
                        locator = %locator,
                        kind = e.kind(),
                        error = %e,
                        "pipeline bug; falling back to original image"
                    );
                } else {
                    warn!(
                        locator = %locator,
                        kind = e.kind(),
                        error = %e,
                        "background removal failed; falling back to original image"
                    );
                }
                ResultHandle::fallback(locator.clone())
            },
        }
    }

    /// Process a locator, surfacing stage errors to the caller
    ///
    /// Stages run strictly in order; each consumes only the previous
    /// stage's output, and the first failure short-circuits the rest (the
    /// run's early return is its `Failed` transition).
    ///
    /// # Errors
    /// - `CutoutError::Fetch` / `Decode` from the loader
    /// - `CutoutError::Inference` from model acquisition or segmentation
    /// - `CutoutError::DimensionMismatch` from the compositor
    /// - `CutoutError::Encode` from output serialization
    #[instrument(skip(self), fields(locator = %locator))]
    pub async fn try_process(&self, locator: &ImageLocator) -> Result<ResultHandle> {
        let mut stage = PipelineStage::Idle;

        advance(&mut stage, PipelineStage::Loading);
        let image = self
            .loader
            .load(locator)
            .instrument(span!(Level::DEBUG, "loading"))
            .await?;

        advance(&mut stage, PipelineStage::Segmenting);
        let mask = async {
            let backend = self.backend().await?;
            let segmenter = Segmenter::new(backend);
            debug!(backend = segmenter.backend_name(), "running segmentation");
            segmenter.segment(&image).await
        }
        .instrument(span!(
            Level::INFO,
            "segmenting",
            width = image.width(),
            height = image.height()
        ))
        .await?;

        advance(&mut stage, PipelineStage::Compositing);
        let composited = {
            let _span = span!(Level::DEBUG, "compositing").entered();
            composite(&image, &mask)?
        };

        advance(&mut stage, PipelineStage::Encoding);
        let bytes = {
            let _span = span!(Level::DEBUG, "encoding").entered();
            encode_png(&composited)?
        };

        advance(&mut stage, PipelineStage::Succeeded);
        Ok(ResultHandle::processed(bytes))
    }
}

/// Move the run's state machine strictly forward
fn advance(stage: &mut PipelineStage, next: PipelineStage) {
    debug_assert!(
        !stage.is_terminal(),
        "stage transition out of terminal state {}",
        stage.name()
    );
    debug!(from = stage.name(), to = next.name(), "stage transition");
    *stage = next;
}
