//! Tiled watermark compositor.
//!
//! A pass copies the base image onto a fresh surface, rotates the drawing
//! space by the tile angle and stamps the signature on a square grid whose
//! pitch is `max(width, height) / density`. The grid over-scans from
//! `-dimension` to `2 * dimension` on both axes so the rotated pattern reaches
//! every corner.

use std::time::Instant;

use ab_glyph::FontArc;
use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::blending::{self, Rotation};
use crate::error::{Error, Result};
use crate::params::{SignatureSpec, TileParams};
use crate::text;

/// Draws tiled signatures. Holds the font used for text signatures.
///
/// Create once and reuse; a pass never mutates the compositor.
#[derive(Clone)]
pub struct Compositor {
    font: FontArc,
}

impl std::fmt::Debug for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compositor").finish_non_exhaustive()
    }
}

impl Compositor {
    /// Compositor using the embedded default font.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Font`] if the embedded font cannot be parsed.
    pub fn new() -> Result<Self> {
        Ok(Self::with_font(text::default_font()?))
    }

    /// Compositor using a caller-supplied font.
    #[must_use]
    pub fn with_font(font: FontArc) -> Self {
        Self { font }
    }

    /// The font used for text signatures.
    #[must_use]
    pub fn font(&self) -> &FontArc {
        &self.font
    }

    /// Tile `signature` across a copy of `base`.
    ///
    /// With no signature (or an empty text) the copy is returned untouched and
    /// `params` are not inspected. The output always has the dimensions of
    /// `base`.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyImage`] if `base` has no pixels.
    /// - [`Error::InvalidParam`] if `params` fail validation.
    /// - [`Error::InvalidSignature`] for an unusable signature.
    pub fn composite(
        &self,
        base: &RgbaImage,
        signature: Option<&SignatureSpec>,
        params: &TileParams,
    ) -> Result<RgbaImage> {
        let (width, height) = base.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::EmptyImage { width, height });
        }

        let mut surface = base.clone();
        let Some(signature) = signature.filter(|s| !s.is_blank()) else {
            return Ok(surface);
        };
        params.validate()?;

        let started = Instant::now();
        let spacing = params.spacing(width, height);
        let rotation = Rotation::new(params.radians());
        let origins = tile_origins(width, height, spacing);

        match signature {
            SignatureSpec::Text(sig) => {
                let sprite =
                    text::render_text(&self.font, &sig.content, sig.font_size_px, sig.color)?;
                // The fill colour carries `opacity` as its alpha and the global
                // alpha multiplies it again.
                let text_opacity = params.opacity * params.opacity;
                for &(x, y) in &origins {
                    let (left, top) = sprite.top_left_at(x, y);
                    blending::draw_sprite_rotated(
                        &mut surface,
                        &sprite.image,
                        left,
                        top,
                        rotation,
                        text_opacity,
                    );
                }
            }
            SignatureSpec::Raster(image) => {
                let sprite = scaled_raster(image, width, params.size_percent)?;
                for &(x, y) in &origins {
                    blending::draw_sprite_rotated(
                        &mut surface,
                        &sprite,
                        x,
                        y,
                        rotation,
                        params.opacity,
                    );
                }
            }
        }

        tracing::debug!(
            width,
            height,
            spacing,
            tiles = origins.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "composited signature"
        );

        Ok(surface)
    }
}

/// Composite with the embedded default font.
///
/// See [`Compositor::composite`].
///
/// # Errors
///
/// Same as [`Compositor::composite`], plus [`Error::Font`] if the embedded
/// font cannot be loaded.
pub fn composite(
    base: &RgbaImage,
    signature: Option<&SignatureSpec>,
    params: &TileParams,
) -> Result<RgbaImage> {
    Compositor::new()?.composite(base, signature, params)
}

/// Tile anchor points in rotated space, row by row.
///
/// Both axes run from `-dimension` (inclusive) to `2 * dimension` (exclusive)
/// in steps of `spacing`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn tile_origins(width: u32, height: u32, spacing: f32) -> Vec<(f32, f32)> {
    if !(spacing.is_finite() && spacing > 0.0) {
        return Vec::new();
    }

    let axis = |dim: u32| -> Vec<f32> {
        let dim = dim as f32;
        (0u32..)
            .map(|i| -dim + i as f32 * spacing)
            .take_while(|&p| p < 2.0 * dim)
            .collect()
    };

    let xs = axis(width);
    let ys = axis(height);
    ys.iter()
        .flat_map(|&y| xs.iter().map(move |&x| (x, y)))
        .collect()
}

/// Draw size of a raster signature: `size_percent` of the canvas width, with
/// the height following the signature's aspect ratio.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn raster_tile_size(canvas_width: u32, signature: &RgbaImage, size_percent: f32) -> (f32, f32) {
    let width = canvas_width as f32 * size_percent / 100.0;
    let aspect = signature.width() as f32 / signature.height() as f32;
    (width, width / aspect)
}

/// Resize a raster signature once per pass to its tile size.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled_raster(signature: &RgbaImage, canvas_width: u32, size_percent: f32) -> Result<RgbaImage> {
    if signature.width() == 0 || signature.height() == 0 {
        return Err(Error::InvalidSignature(format!(
            "signature image is empty ({}x{})",
            signature.width(),
            signature.height()
        )));
    }

    let (w, h) = raster_tile_size(canvas_width, signature, size_percent);
    let w = w.round().max(1.0) as u32;
    let h = h.round().max(1.0) as u32;
    if signature.dimensions() == (w, h) {
        return Ok(signature.clone());
    }
    Ok(imageops::resize(signature, w, h, FilterType::Triangle))
}
