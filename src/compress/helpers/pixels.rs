//! Unpacking of raw PDF image samples into 8-bit RGB

use image::RgbImage;

use crate::error::ImageRecodeError;
use crate::model::ColorSpace;

/// Convert unpacked image samples to an RGB buffer.
///
/// `samples` holds rows padded to whole bytes, as PDF stores them.
pub fn to_rgb(
    samples: &[u8],
    width: u32,
    height: u32,
    bits_per_component: u8,
    color_space: &ColorSpace,
) -> Result<RgbImage, ImageRecodeError> {
    if !matches!(bits_per_component, 1 | 2 | 4 | 8) {
        return Err(ImageRecodeError::UnsupportedBitDepth(i64::from(
            bits_per_component,
        )));
    }
    let components = color_space
        .components()
        .ok_or_else(|| ImageRecodeError::UnsupportedColorSpace(color_space.to_string()))?;

    let width = width as usize;
    let height_rows = height as usize;
    let row_bytes = (width * components * bits_per_component as usize + 7) / 8;
    let expected = row_bytes * height_rows;
    if samples.len() < expected {
        return Err(ImageRecodeError::Truncated {
            expected,
            actual: samples.len(),
        });
    }

    let mut rgb = Vec::with_capacity(width * height_rows * 3);
    let mut pixel = Vec::with_capacity(components);

    for row in samples[..expected].chunks(row_bytes) {
        for x in 0..width {
            pixel.clear();
            for c in 0..components {
                pixel.push(sample_at(row, x * components + c, bits_per_component));
            }

            let color = match color_space {
                ColorSpace::Indexed {
                    base,
                    hival,
                    lookup,
                } => {
                    let index = pixel[0].min(*hival) as usize;
                    let base_components = base.components().unwrap_or(1);
                    let start = index * base_components;
                    let entry: Vec<u8> = (start..start + base_components)
                        .map(|i| lookup.get(i).copied().unwrap_or(0))
                        .collect();
                    device_to_rgb(base, &entry)
                }
                _ => {
                    for value in pixel.iter_mut() {
                        *value = scale(*value, bits_per_component);
                    }
                    device_to_rgb(color_space, &pixel)
                }
            };
            rgb.extend_from_slice(&color);
        }
    }

    RgbImage::from_raw(width as u32, height, rgb)
        .ok_or_else(|| ImageRecodeError::Decode("pixel buffer size mismatch".to_string()))
}

/// Read the `index`-th sample of a packed row
fn sample_at(row: &[u8], index: usize, bits: u8) -> u8 {
    if bits == 8 {
        return row[index];
    }
    let bit_offset = index * bits as usize;
    let byte = row[bit_offset / 8];
    let shift = 8 - bits as usize - bit_offset % 8;
    let mask = (1u16 << bits) - 1;
    (byte >> shift) & mask as u8
}

/// Stretch an n-bit sample to the 0-255 range
fn scale(value: u8, bits: u8) -> u8 {
    if bits == 8 {
        return value;
    }
    let max = (1u32 << bits) - 1;
    (u32::from(value) * 255 / max) as u8
}

fn device_to_rgb(space: &ColorSpace, c: &[u8]) -> [u8; 3] {
    match (space, c) {
        (ColorSpace::DeviceRGB, [r, g, b, ..]) => [*r, *g, *b],
        (ColorSpace::DeviceCMYK, [c, m, y, k, ..]) => {
            let channel = |v: u8| {
                let ink = u32::from(v) + u32::from(*k);
                255u32.saturating_sub(ink.min(255)) as u8
            };
            [channel(*c), channel(*m), channel(*y)]
        }
        (_, [gray, ..]) => [*gray, *gray, *gray],
        (_, []) => [0, 0, 0],
    }
}
