/// Default lossless content stream compression level (0-9)
pub const DEFAULT_CONTENT_STREAM_LEVEL: u8 = 9;

/// Default lossy image quality (0-100, 100 disables image recoding)
pub const DEFAULT_IMAGE_QUALITY: u8 = 75;

/// Highest quality at which non-photographic images are forced through JPEG
pub const DEFAULT_FALLBACK_THRESHOLD: u8 = 40;

/// Highest accepted content stream level
pub const MAX_CONTENT_STREAM_LEVEL: u8 = 9;

/// Highest accepted image quality
pub const MAX_IMAGE_QUALITY: u8 = 100;

/// Image quality at which no image processing happens at all
pub const LOSSLESS_IMAGE_QUALITY: u8 = 100;
