use crate::cli::Args;
use crate::error::ConfigError;

use super::defaults::*;

/// Per-run compression settings.
///
/// Immutable once built; every constructor validates the ranges so the
/// pipeline never sees an out-of-range level or quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionSettings {
    content_stream_level: u8,
    image_quality: u8,
    fallback_threshold: u8,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            content_stream_level: DEFAULT_CONTENT_STREAM_LEVEL,
            image_quality: DEFAULT_IMAGE_QUALITY,
            fallback_threshold: DEFAULT_FALLBACK_THRESHOLD,
        }
    }
}

impl CompressionSettings {
    /// Create settings with the default fallback threshold
    pub fn new(content_stream_level: u8, image_quality: u8) -> Result<Self, ConfigError> {
        if content_stream_level > MAX_CONTENT_STREAM_LEVEL {
            return Err(ConfigError::ContentLevelOutOfRange(content_stream_level));
        }
        if image_quality > MAX_IMAGE_QUALITY {
            return Err(ConfigError::ImageQualityOutOfRange(image_quality));
        }

        Ok(Self {
            content_stream_level,
            image_quality,
            fallback_threshold: DEFAULT_FALLBACK_THRESHOLD,
        })
    }

    /// Create settings from CLI arguments
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        Self::new(args.level, args.quality)?.with_fallback_threshold(args.fallback_threshold)
    }

    /// Override the quality at or below which non-photographic images are
    /// re-encoded as JPEG
    pub fn with_fallback_threshold(mut self, threshold: u8) -> Result<Self, ConfigError> {
        if threshold > MAX_IMAGE_QUALITY {
            return Err(ConfigError::ThresholdOutOfRange(threshold));
        }
        self.fallback_threshold = threshold;
        Ok(self)
    }

    /// Lossless content stream level, 0 (passthrough) to 9 (maximum)
    pub fn content_stream_level(&self) -> u8 {
        self.content_stream_level
    }

    /// Lossy image quality, 0 to 100
    pub fn image_quality(&self) -> u8 {
        self.image_quality
    }

    pub fn fallback_threshold(&self) -> u8 {
        self.fallback_threshold
    }

    /// Whether images are touched at all
    pub fn recodes_images(&self) -> bool {
        self.image_quality < LOSSLESS_IMAGE_QUALITY
    }

    /// Whether non-photographic images qualify for the lossy JPEG fallback
    pub fn allows_fallback(&self) -> bool {
        self.image_quality <= self.fallback_threshold
    }
}
