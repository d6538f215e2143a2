//! Error types for the background removal pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, CutoutError>;

/// Error kinds produced by the pipeline stages
///
/// Every variant maps to exactly one stage of the pipeline. The orchestrator
/// absorbs all of them into the fallback path; only `try_process` surfaces
/// them to callers.
#[derive(Error, Debug)]
pub enum CutoutError {
    /// Network failure or unreachable locator while fetching the source image
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Malformed or unsupported source image bytes
    #[error("Decode error: {0}")]
    Decode(String),

    /// Model acquisition, load, or runtime failure during segmentation
    #[error("Inference error: {0}")]
    Inference(String),

    /// Image and mask dimensions disagree; an internal contract violation
    #[error("Dimension mismatch: image is {expected:?}, mask is {actual:?}")]
    DimensionMismatch {
        /// Dimensions of the decoded source image
        expected: (u32, u32),
        /// Dimensions of the segmentation mask
        actual: (u32, u32),
    },

    /// Output serialization failure
    #[error("Encode error: {0}")]
    Encode(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Filesystem errors during model caching
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CutoutError {
    /// Create a new fetch error
    pub fn fetch<S: Into<String>>(msg: S) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new encode error
    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a fetch error with locator context
    pub fn fetch_locator(locator: &str, details: impl std::fmt::Display) -> Self {
        Self::Fetch(format!("failed to fetch '{locator}': {details}"))
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path.as_ref().display(), error),
        ))
    }

    /// True for errors that indicate an internal bug rather than an
    /// environmental condition. These are logged at a higher severity.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. })
    }

    /// Short stable name of the error kind, used in log fields
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::Decode(_) => "decode",
            Self::Inference(_) => "inference",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::Encode(_) => "encode",
            Self::InvalidConfig(_) => "invalid_config",
            Self::Io(_) => "io",
        }
    }
}
