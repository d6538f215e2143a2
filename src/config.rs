//! Configuration types for the background removal pipeline

use crate::error::{CutoutError, Result};
use crate::models::ModelSpec;
use std::time::Duration;

/// Configuration for one pipeline instance
///
/// Shared by every run the pipeline executes; per-run state lives in the
/// orchestrator, not here.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Which segmentation model to acquire and run
    pub model_spec: ModelSpec,
    /// Timeout applied to the source-image HTTP fetch
    pub fetch_timeout: Duration,
    /// Upper bound on the source image payload, in bytes
    pub max_source_bytes: u64,
    /// Number of threads Tract may use for one inference call (0 = auto)
    pub inference_threads: usize,
}

impl PipelineConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_spec: ModelSpec::default(),
            fetch_timeout: Duration::from_secs(30),
            max_source_bytes: 64 * 1024 * 1024,
            inference_threads: 0,
        }
    }
}

/// Builder for [`PipelineConfig`]
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    #[must_use]
    pub fn model_spec(mut self, model_spec: ModelSpec) -> Self {
        self.config.model_spec = model_spec;
        self
    }

    #[must_use]
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_source_bytes(mut self, limit: u64) -> Self {
        self.config.max_source_bytes = limit;
        self
    }

    #[must_use]
    pub fn inference_threads(mut self, threads: usize) -> Self {
        self.config.inference_threads = threads;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// Returns `CutoutError::InvalidConfig` for:
    /// - A zero fetch timeout
    /// - A zero source size limit
    pub fn build(self) -> Result<PipelineConfig> {
        if self.config.fetch_timeout.is_zero() {
            return Err(CutoutError::invalid_config(
                "fetch timeout must be non-zero",
            ));
        }
        if self.config.max_source_bytes == 0 {
            return Err(CutoutError::invalid_config(
                "max source size must be non-zero",
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds() {
        let config = PipelineConfig::builder().build().unwrap();
        assert_eq!(config.fetch_timeout, Duration::from_secs(30));
        assert_eq!(config.inference_threads, 0);
    }

    #[test]
    fn test_builder_chain() {
        let config = PipelineConfig::builder()
            .fetch_timeout(Duration::from_secs(5))
            .max_source_bytes(1024)
            .inference_threads(2)
            .build()
            .unwrap();

        assert_eq!(config.fetch_timeout, Duration::from_secs(5));
        assert_eq!(config.max_source_bytes, 1024);
        assert_eq!(config.inference_threads, 2);
    }

    #[test]
    fn test_builder_rejects_zero_timeout() {
        let result = PipelineConfig::builder()
            .fetch_timeout(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(CutoutError::InvalidConfig(_))));
    }

    #[test]
    fn test_builder_rejects_zero_size_limit() {
        let result = PipelineConfig::builder().max_source_bytes(0).build();
        assert!(matches!(result, Err(CutoutError::InvalidConfig(_))));
    }
}
