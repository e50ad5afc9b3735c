//! Signature and tiling parameters.
//!
//! These are plain values resolved once at pipeline entry. The compositor never
//! reads any other state, so a pass is a pure function of the base image, the
//! [`SignatureSpec`] and the [`TileParams`].

use image::{Rgb, RgbaImage};

use crate::error::{Error, Result};

/// Lowest accepted opacity.
pub const MIN_OPACITY: f32 = 0.1;
/// Highest accepted opacity.
pub const MAX_OPACITY: f32 = 1.0;
/// Highest accepted tile density.
pub const MAX_DENSITY: u8 = 5;

/// Parameters controlling how a signature is tiled across the base image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileParams {
    /// Global alpha applied to every tile, in `[0.1, 1.0]`.
    pub opacity: f32,
    /// Clockwise rotation of the tile grid, in `[0, 360]` degrees.
    pub angle_degrees: f32,
    /// Grid density in `1..=5`. Controls spacing, not tile count.
    pub density: u8,
    /// Raster signature width as a percentage of the canvas width.
    pub size_percent: f32,
}

impl Default for TileParams {
    fn default() -> Self {
        Self {
            opacity: 0.5,
            angle_degrees: 45.0,
            density: 3,
            size_percent: 30.0,
        }
    }
}

impl TileParams {
    /// Check every field against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParam`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_OPACITY..=MAX_OPACITY).contains(&self.opacity) {
            return Err(Error::InvalidParam {
                name: "opacity",
                value: self.opacity,
                expected: "0.1..=1.0",
            });
        }
        if !(0.0..=360.0).contains(&self.angle_degrees) {
            return Err(Error::InvalidParam {
                name: "angle",
                value: self.angle_degrees,
                expected: "0..=360 degrees",
            });
        }
        if !(1..=MAX_DENSITY).contains(&self.density) {
            return Err(Error::InvalidParam {
                name: "density",
                value: f32::from(self.density),
                expected: "1..=5",
            });
        }
        if !(self.size_percent > 0.0 && self.size_percent <= 100.0) {
            return Err(Error::InvalidParam {
                name: "size",
                value: self.size_percent,
                expected: "a percentage in (0, 100]",
            });
        }
        Ok(())
    }

    /// Distance between neighbouring tiles: `max(width, height) / density`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn spacing(&self, width: u32, height: u32) -> f32 {
        width.max(height) as f32 / f32::from(self.density.max(1))
    }

    /// Rotation in radians, with the angle taken modulo a full turn.
    ///
    /// 360° therefore yields exactly the same transform as 0°.
    #[must_use]
    pub fn radians(&self) -> f32 {
        self.angle_degrees.rem_euclid(360.0).to_radians()
    }
}

/// A text signature.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSignature {
    /// Text drawn at every tile position.
    pub content: String,
    /// Font size in pixels.
    pub font_size_px: f32,
    /// Fill colour.
    pub color: Rgb<u8>,
}

/// The watermark content. Exactly one kind is active at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum SignatureSpec {
    /// Text rendered with the compositor's font.
    Text(TextSignature),
    /// A translucent raster, typically decoded from a PNG.
    Raster(RgbaImage),
}

impl SignatureSpec {
    /// Build a text signature.
    pub fn text(content: impl Into<String>, font_size_px: f32, color: Rgb<u8>) -> Self {
        Self::Text(TextSignature {
            content: content.into(),
            font_size_px,
            color,
        })
    }

    /// Whether drawing this signature would leave the base untouched.
    ///
    /// An empty text is equivalent to no signature at all.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(text) => text.content.is_empty(),
            Self::Raster(_) => false,
        }
    }
}

/// Parse a `#RGB` or `#RRGGBB` colour string.
///
/// # Errors
///
/// Returns [`Error::InvalidSignature`] if the string is not a hex colour.
pub fn parse_hex_color(hex: &str) -> Result<Rgb<u8>> {
    let digits = hex
        .strip_prefix('#')
        .ok_or_else(|| Error::InvalidSignature(format!("colour must start with '#': {hex}")))?;
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::InvalidSignature(format!(
            "invalid hex digit in colour: {hex}"
        )));
    }

    let channel = |s: &str| {
        u8::from_str_radix(s, 16)
            .map_err(|_| Error::InvalidSignature(format!("invalid hex digit in colour: {hex}")))
    };

    match digits.len() {
        // Each nibble doubled: 0xA -> 0xAA.
        3 => Ok(Rgb([
            channel(&digits[0..1])? * 17,
            channel(&digits[1..2])? * 17,
            channel(&digits[2..3])? * 17,
        ])),
        6 => Ok(Rgb([
            channel(&digits[0..2])?,
            channel(&digits[2..4])?,
            channel(&digits[4..6])?,
        ])),
        n => Err(Error::InvalidSignature(format!(
            "colour must be #RGB or #RRGGBB, got {n} digits"
        ))),
    }
}
