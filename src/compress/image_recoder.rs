//! Lossy image re-encoding
//!
//! JPEG images are re-encoded at the target quality. Everything that is not
//! photographic is only converted to JPEG when the quality is at or below
//! the fallback threshold; above it the image is reported as skipped.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageFormat};
use lopdf::Dictionary;

use crate::config::CompressionSettings;
use crate::error::ImageRecodeError;
use crate::model::{ColorSpace, EmbeddedImage, FilterTag, PhotoCodec, RecodedImage, SkipReason};

use super::helpers::{flate, pixels};

/// Largest dimension a baseline JPEG can describe
const MAX_JPEG_DIMENSION: i64 = u16::MAX as i64;

/// Largest raw image converted to JPEG, in pixels
const MAX_FALLBACK_PIXELS: u64 = 64 * 1024 * 1024;

/// Result of a recode attempt that did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum RecodeOutcome {
    Encoded(RecodedImage),
    Skipped(SkipReason),
}

/// Re-encodes single images at a fixed quality
#[derive(Debug, Clone, Copy)]
pub struct ImageRecoder {
    quality: u8,
    fallback_threshold: u8,
}

impl ImageRecoder {
    pub fn new(settings: &CompressionSettings) -> Self {
        Self {
            quality: settings.image_quality(),
            fallback_threshold: settings.fallback_threshold(),
        }
    }

    pub fn recode(&self, image: &EmbeddedImage) -> Result<RecodeOutcome, ImageRecodeError> {
        match image.filter {
            FilterTag::Photographic(PhotoCodec::Jpeg) => {
                self.recode_jpeg(image).map(RecodeOutcome::Encoded)
            }
            FilterTag::Photographic(PhotoCodec::Jpeg2000) => Err(ImageRecodeError::Unsupported(
                "no JPEG2000 encoder available".to_string(),
            )),
            FilterTag::Other if self.quality <= self.fallback_threshold => {
                self.convert_to_jpeg(image).map(RecodeOutcome::Encoded)
            }
            FilterTag::Other => Ok(RecodeOutcome::Skipped(SkipReason::AboveFallbackThreshold {
                quality: self.quality,
                threshold: self.fallback_threshold,
            })),
        }
    }

    /// Decode a DCT stream and encode it again at the target quality
    fn recode_jpeg(&self, image: &EmbeddedImage) -> Result<RecodedImage, ImageRecodeError> {
        if image.data.is_empty() {
            return Err(ImageRecodeError::EmptyData);
        }
        // Separation, DeviceN and Lab samples do not mean the same as device gray or RGB
        if let Some(ColorSpace::Unsupported(name)) = &image.color_space {
            return Err(ImageRecodeError::UnsupportedColorSpace(name.clone()));
        }

        let decoded = image::load_from_memory_with_format(&image.data, ImageFormat::Jpeg)
            .map_err(|e| ImageRecodeError::Decode(e.to_string()))?;
        let (width, height) = (decoded.width(), decoded.height());

        let (data, channels) = match decoded {
            DynamicImage::ImageLuma8(gray) => (
                self.encode(gray.as_raw(), width, height, ExtendedColorType::L8)?,
                1,
            ),
            other => {
                let rgb = other.to_rgb8();
                (
                    self.encode(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)?,
                    3,
                )
            }
        };

        // CMYK sources come back as RGB and need their color space replaced
        let color_space = if image.components() == Some(channels) {
            None
        } else if channels == 1 {
            Some("DeviceGray")
        } else {
            Some("DeviceRGB")
        };

        Ok(RecodedImage {
            data,
            filter: FilterTag::JPEG,
            color_space,
        })
    }

    /// Decode raw samples, force them to RGB and store them as JPEG
    fn convert_to_jpeg(&self, image: &EmbeddedImage) -> Result<RecodedImage, ImageRecodeError> {
        if image.image_mask {
            return Err(ImageRecodeError::Unsupported(
                "stencil masks cannot be stored as JPEG".to_string(),
            ));
        }
        if image.data.is_empty() {
            return Err(ImageRecodeError::EmptyData);
        }
        let (width, height) = dimensions(image)?;
        if u64::from(width) * u64::from(height) > MAX_FALLBACK_PIXELS {
            return Err(ImageRecodeError::Unsupported(format!(
                "{}x{} image is too large to convert",
                width, height
            )));
        }

        let color_space = image.color_space.as_ref().ok_or_else(|| {
            ImageRecodeError::UnsupportedColorSpace("missing /ColorSpace".to_string())
        })?;
        if image.has_decode_array {
            return Err(ImageRecodeError::Unsupported(
                "/Decode arrays are not applied".to_string(),
            ));
        }
        let bits = image.bits_per_component.unwrap_or(8);
        if !matches!(bits, 1 | 2 | 4 | 8) {
            return Err(ImageRecodeError::UnsupportedBitDepth(bits));
        }

        let row_len = packed_row_len(u64::from(width), color_space.components(), bits);
        let samples = decode_samples(image, row_len)?;
        let rgb = pixels::to_rgb(&samples, width, height, bits as u8, color_space)?;
        let data = self.encode(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)?;

        Ok(RecodedImage {
            data,
            filter: FilterTag::JPEG,
            color_space: Some("DeviceRGB"),
        })
    }

    fn encode(
        &self,
        pixels: &[u8],
        width: u32,
        height: u32,
        color: ExtendedColorType,
    ) -> Result<Vec<u8>, ImageRecodeError> {
        let mut output = Vec::new();
        // The encoder accepts 1..=100
        let mut encoder = JpegEncoder::new_with_quality(&mut output, self.quality.clamp(1, 100));
        encoder
            .encode(pixels, width, height, color)
            .map_err(|e| ImageRecodeError::Encode(e.to_string()))?;
        Ok(output)
    }
}

fn dimensions(image: &EmbeddedImage) -> Result<(u32, u32), ImageRecodeError> {
    let valid = |v: i64| v > 0 && v <= MAX_JPEG_DIMENSION;
    if !valid(image.width) || !valid(image.height) {
        return Err(ImageRecodeError::InvalidDimensions {
            width: image.width,
            height: image.height,
        });
    }
    Ok((image.width as u32, image.height as u32))
}

/// Bytes in one packed sample row, if it fits in memory at all
fn packed_row_len(width: u64, components: Option<usize>, bits: i64) -> Option<usize> {
    let components = u64::try_from(components?).ok()?;
    let bits = u64::try_from(bits).ok()?;
    let row_bits = width.checked_mul(components)?.checked_mul(bits)?;
    usize::try_from(row_bits.div_ceil(8)).ok()
}

/// Undo the stream's filters, leaving packed samples.
/// `row_len` is the packed row length the image dictionary implies.
fn decode_samples(
    image: &EmbeddedImage,
    row_len: Option<usize>,
) -> Result<Vec<u8>, ImageRecodeError> {
    match image.filters.as_slice() {
        [] => Ok(image.data.clone()),
        [only] if only == b"FlateDecode" => {
            let inflated = flate::inflate(&image.data)
                .map_err(|e| ImageRecodeError::Decode(format!("corrupt Flate stream: {}", e)))?;
            match &image.decode_parms {
                Some(parms) => undo_predictor(inflated, parms, row_len),
                None => Ok(inflated),
            }
        }
        filters => {
            let names: Vec<String> = filters
                .iter()
                .map(|f| String::from_utf8_lossy(f).into_owned())
                .collect();
            Err(ImageRecodeError::UnsupportedFilter(names.join(" + ")))
        }
    }
}

fn undo_predictor(
    data: Vec<u8>,
    parms: &Dictionary,
    image_row_len: Option<usize>,
) -> Result<Vec<u8>, ImageRecodeError> {
    let int = |key: &[u8], default: i64| {
        parms
            .get(key)
            .ok()
            .and_then(|v| v.as_i64().ok())
            .unwrap_or(default)
    };

    match int(b"Predictor", 1) {
        1 => Ok(data),
        predictor if predictor >= 10 => {
            let colors = int(b"Colors", 1).max(1) as u64;
            let bits = int(b"BitsPerComponent", 8).max(1) as u64;
            let columns = int(b"Columns", 1).max(1) as u64;
            let invalid = || {
                ImageRecodeError::Decode(format!(
                    "invalid predictor parameters: {} colors, {} bits, {} columns",
                    colors, bits, columns
                ))
            };

            let pixel_bits = colors.checked_mul(bits).ok_or_else(invalid)?;
            let row_bits = pixel_bits.checked_mul(columns).ok_or_else(invalid)?;
            let row_len = usize::try_from(row_bits.div_ceil(8)).map_err(|_| invalid())?;
            let bpp = usize::try_from(pixel_bits.div_ceil(8)).map_err(|_| invalid())?;

            if row_len > data.len() {
                return Err(invalid());
            }
            if image_row_len.is_some_and(|expected| expected != row_len) {
                return Err(ImageRecodeError::Decode(format!(
                    "predictor rows of {} bytes do not match the image width",
                    row_len
                )));
            }
            flate::undo_png_predictor(&data, row_len, bpp).map_err(ImageRecodeError::Decode)
        }
        other => Err(ImageRecodeError::Unsupported(format!("predictor {}", other))),
    }
}
