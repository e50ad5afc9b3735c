//! Hidden copyright payload.
//!
//! The exported image carries a short text payload in the least-significant
//! bits of its colour channels. Encoding is a best-effort step: when it fails
//! the caller keeps the plain composite and the cause is logged.
//!
//! # Bit layout
//!
//! A 32-bit big-endian byte count followed by the UTF-8 payload bytes, each
//! written most-significant bit first into the LSB of R, G and B of every
//! pixel in row-major order. Alpha is never touched.

use std::sync::Arc;

use chrono::Datelike;
use image::RgbaImage;

use crate::error::StegoError;

/// Bits spent on the length header.
const HEADER_BITS: u64 = 32;
/// Colour channels carrying payload bits per pixel.
const CHANNELS_PER_PIXEL: u64 = 3;

/// A codec that hides a text payload inside pixel data.
///
/// Implementations must return an image with the same dimensions as the input.
pub trait StegoEncoder: Send + Sync {
    /// Embed `payload` into a copy of `image`.
    ///
    /// # Errors
    ///
    /// Returns a [`StegoError`] when the payload cannot be embedded.
    fn encode(&self, payload: &str, image: &RgbaImage) -> Result<RgbaImage, StegoError>;
}

/// Least-significant-bit encoder over the RGB channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct LsbEncoder;

impl LsbEncoder {
    /// Number of payload-carrying bits in a `width` x `height` image.
    #[must_use]
    pub fn capacity_bits(width: u32, height: u32) -> u64 {
        u64::from(width) * u64::from(height) * CHANNELS_PER_PIXEL
    }
}

/// Byte offset in an RGBA buffer of the `n`-th payload bit.
#[allow(clippy::cast_possible_truncation)]
fn bit_offset(n: u64) -> usize {
    let pixel = n / CHANNELS_PER_PIXEL;
    let channel = n % CHANNELS_PER_PIXEL;
    (pixel * 4 + channel) as usize
}

impl StegoEncoder for LsbEncoder {
    fn encode(&self, payload: &str, image: &RgbaImage) -> Result<RgbaImage, StegoError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(StegoError::EmptyImage);
        }

        let bytes = payload.as_bytes();
        let available = Self::capacity_bits(width, height);
        let needed = HEADER_BITS + bytes.len() as u64 * 8;
        let length = u32::try_from(bytes.len()).map_err(|_| StegoError::CapacityExceeded {
            needed,
            available,
        })?;
        if needed > available {
            return Err(StegoError::CapacityExceeded { needed, available });
        }

        let mut out = image.clone();
        let raw: &mut [u8] = &mut out;
        let header = length.to_be_bytes();
        let bits = header
            .iter()
            .chain(bytes)
            .flat_map(|byte| (0..8).rev().map(move |i| (byte >> i) & 1));

        for (n, bit) in (0u64..).zip(bits) {
            let offset = bit_offset(n);
            raw[offset] = (raw[offset] & 0xFE) | bit;
        }

        Ok(out)
    }
}

fn read_bytes(raw: &[u8], first_bit: u64, count: usize) -> Vec<u8> {
    (0..count as u64)
        .map(|byte| {
            (0..8).fold(0u8, |acc, i| {
                let offset = bit_offset(first_bit + byte * 8 + i);
                (acc << 1) | (raw[offset] & 1)
            })
        })
        .collect()
}

/// Recover a payload written by [`LsbEncoder`].
///
/// # Errors
///
/// - [`StegoError::EmptyImage`] if the image has no pixels.
/// - [`StegoError::NoPayload`] if the header is missing or out of range.
/// - [`StegoError::InvalidUtf8`] if the payload bytes are not UTF-8.
pub fn decode(image: &RgbaImage) -> Result<String, StegoError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(StegoError::EmptyImage);
    }
    let available = LsbEncoder::capacity_bits(width, height);
    if available < HEADER_BITS {
        return Err(StegoError::NoPayload);
    }

    let raw: &[u8] = image;
    let header = read_bytes(raw, 0, 4);
    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    if HEADER_BITS + u64::from(length) * 8 > available {
        return Err(StegoError::NoPayload);
    }

    let payload = read_bytes(raw, HEADER_BITS, length as usize);
    String::from_utf8(payload).map_err(|_| StegoError::InvalidUtf8)
}

/// Encode, falling back to an unmodified copy of `image` on failure.
#[must_use]
pub fn encode_or_fallback(encoder: &dyn StegoEncoder, payload: &str, image: &RgbaImage) -> RgbaImage {
    match encoder.encode(payload, image) {
        Ok(encoded) if encoded.dimensions() == image.dimensions() => encoded,
        Ok(encoded) => {
            tracing::warn!(
                expected = ?image.dimensions(),
                got = ?encoded.dimensions(),
                "stego encoder changed image size, exporting without payload"
            );
            image.clone()
        }
        Err(e) => {
            tracing::warn!(error = %e, "stego encoding failed, exporting without payload");
            image.clone()
        }
    }
}

/// Run the encoder on the blocking pool, with the same fallback as
/// [`encode_or_fallback`]. A panicking encoder also falls back.
pub async fn encode_async(
    encoder: Arc<dyn StegoEncoder>,
    payload: String,
    image: RgbaImage,
) -> RgbaImage {
    let shared = Arc::new(image);
    let worker = Arc::clone(&shared);
    let joined =
        tokio::task::spawn_blocking(move || encode_or_fallback(encoder.as_ref(), &payload, &worker))
            .await;

    match joined {
        Ok(encoded) => encoded,
        Err(e) => {
            tracing::warn!(error = %e, "stego task failed, exporting without payload");
            Arc::try_unwrap(shared).unwrap_or_else(|arc| (*arc).clone())
        }
    }
}

/// The payload embedded on export: `"Copyright <year>"`.
#[must_use]
pub fn copyright_payload(year: i32) -> String {
    format!("Copyright {year}")
}

/// [`copyright_payload`] for the current UTC year.
#[must_use]
pub fn current_copyright_payload() -> String {
    copyright_payload(chrono::Utc::now().year())
}
