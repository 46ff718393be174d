use thiserror::Error;

use crate::pipeline::Stage;

/// Fatal failures that abort a whole compression run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid compression settings: {0}")]
    InvalidSettings(#[from] ConfigError),

    #[error("Failed to parse PDF: {0}")]
    DocumentParse(String),

    #[error("Failed to serialize compressed PDF: {0}")]
    Serialization(String),
}

impl PipelineError {
    /// The pipeline stage the run was in when it failed
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::InvalidSettings(_) => Stage::Idle,
            PipelineError::DocumentParse(_) => Stage::Parsing,
            PipelineError::Serialization(_) => Stage::Serializing,
        }
    }
}

/// Per-image failure. Never aborts the pipeline; it ends up in the diagnostics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageRecodeError {
    #[error("image stream is empty")]
    EmptyData,

    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: i64, height: i64 },

    #[error("image data truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("unsupported color space: {0}")]
    UnsupportedColorSpace(String),

    #[error("unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("unsupported bits per component: {0}")]
    UnsupportedBitDepth(i64),

    #[error("unsupported image: {0}")]
    Unsupported(String),

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("failed to encode image: {0}")]
    Encode(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("content stream level must be between 0 and 9, got {0}")]
    ContentLevelOutOfRange(u8),

    #[error("image quality must be between 0 and 100, got {0}")]
    ImageQualityOutOfRange(u8),

    #[error("fallback threshold must be between 0 and 100, got {0}")]
    ThresholdOutOfRange(u8),
}
