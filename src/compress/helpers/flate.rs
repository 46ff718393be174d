//! zlib stream helpers
//!
//! Uses flate2 directly instead of `lopdf::Document::compress` so the
//! compression level can be chosen per run.

use std::io::{self, Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

/// Largest inflated stream accepted from a document
pub const MAX_INFLATED_LEN: u64 = 256 * 1024 * 1024;

/// Inflate zlib data, up to [`MAX_INFLATED_LEN`] bytes
pub fn inflate(data: &[u8]) -> io::Result<Vec<u8>> {
    inflate_limited(data, MAX_INFLATED_LEN)
}

/// Inflate zlib data, failing once the output would exceed `limit` bytes
pub fn inflate_limited(data: &[u8], limit: u64) -> io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data).take(limit.saturating_add(1));
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded)?;
    if decoded.len() as u64 > limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("inflated stream exceeds {} bytes", limit),
        ));
    }
    Ok(decoded)
}

/// Deflate data at a zlib level between 0 and 9
pub fn deflate(data: &[u8], level: u8) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(u32::from(level.min(9))));
    encoder.write_all(data)?;
    encoder.finish()
}

/// Reverse PNG row predictors (`/Predictor` 10-15).
///
/// Each row starts with a filter-type byte; `row_len` is the unfiltered row
/// length in bytes and `bpp` the number of bytes per complete pixel
/// (at least one).
pub fn undo_png_predictor(data: &[u8], row_len: usize, bpp: usize) -> Result<Vec<u8>, String> {
    if row_len == 0 {
        return Err("predictor row length is zero".to_string());
    }
    let stride = row_len
        .checked_add(1)
        .filter(|&stride| stride <= data.len())
        .ok_or_else(|| {
            format!(
                "predictor row of {} bytes is longer than the {} byte stream",
                row_len,
                data.len()
            )
        })?;
    let bpp = bpp.max(1);
    let mut output = Vec::with_capacity(data.len() / stride * row_len);
    let mut previous = vec![0u8; row_len];

    for chunk in data.chunks(stride) {
        if chunk.len() < stride {
            // Trailing partial row, as written by some producers
            break;
        }
        let filter_type = chunk[0];
        let mut row = chunk[1..].to_vec();

        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = previous[i];
            let up_left = if i >= bpp { previous[i - bpp] } else { 0 };
            let predicted = match filter_type {
                0 => 0,
                1 => left,
                2 => up,
                3 => ((u16::from(left) + u16::from(up)) / 2) as u8,
                4 => paeth(left, up, up_left),
                other => return Err(format!("unknown PNG filter type {}", other)),
            };
            row[i] = row[i].wrapping_add(predicted);
        }

        output.extend_from_slice(&row);
        previous = row;
    }

    Ok(output)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
