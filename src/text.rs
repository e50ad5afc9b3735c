//! Text signature rendering.
//!
//! Text is rasterized once per compositing pass into an unrotated RGBA sprite
//! whose alpha channel holds glyph coverage. The compositor then stamps that
//! sprite at every tile position through the grid rotation.

use std::sync::OnceLock;

use ab_glyph::{point, Font, FontArc, GlyphId, PxScale, ScaleFont};
use image::{Rgb, Rgba, RgbaImage};

use crate::error::{Error, Result};

/// Bundled DejaVu Sans (see `fonts/DejaVuSans-LICENSE.txt`).
const EMBEDDED_FONT_DATA: &[u8] = include_bytes!("fonts/DejaVuSans.ttf");

/// Transparent border around the glyphs so antialiased edges are not clipped.
const PADDING: u32 = 2;

/// Largest accepted font size in pixels.
pub const MAX_FONT_SIZE_PX: f32 = 2048.0;

/// Largest sprite, in pixels, a single run of text may rasterize to.
const MAX_SPRITE_PIXELS: u64 = 1 << 26;

static DEFAULT_FONT: OnceLock<Option<FontArc>> = OnceLock::new();

/// The embedded default font.
///
/// # Errors
///
/// Returns [`Error::Font`] if the embedded data cannot be parsed.
pub fn default_font() -> Result<FontArc> {
    DEFAULT_FONT
        .get_or_init(|| FontArc::try_from_slice(EMBEDDED_FONT_DATA).ok())
        .clone()
        .ok_or_else(|| Error::Font("embedded font is corrupt".to_string()))
}

/// Load a TrueType/OpenType font from raw bytes.
///
/// # Errors
///
/// Returns [`Error::Font`] if the bytes are not a parseable font.
pub fn load_font(data: Vec<u8>) -> Result<FontArc> {
    FontArc::try_from_vec(data).map_err(|e| Error::Font(e.to_string()))
}

/// Scale for a CSS-style pixel font size (the em square, not the line height).
fn em_scale(font: &FontArc, font_size_px: f32) -> PxScale {
    match font.units_per_em() {
        Some(upem) if upem > 0.0 => PxScale::from(font_size_px * font.height_unscaled() / upem),
        _ => PxScale::from(font_size_px),
    }
}

/// A rasterized run of text.
#[derive(Debug, Clone)]
pub struct TextSprite {
    /// Unrotated RGBA sprite; alpha is glyph coverage.
    pub image: RgbaImage,
    /// Horizontal offset of the pen start from the sprite's left edge.
    pub origin_x: f32,
    /// Vertical offset of the alphabetic baseline from the sprite's top edge.
    pub baseline: f32,
}

impl TextSprite {
    /// Top-left corner of the sprite when its pen start and baseline sit at `(x, y)`.
    #[must_use]
    pub fn top_left_at(&self, x: f32, y: f32) -> (f32, f32) {
        (x - self.origin_x, y - self.baseline)
    }
}

fn advance_width(font: &FontArc, scale: PxScale, text: &str) -> f32 {
    let scaled = font.as_scaled(scale);
    let mut width = 0.0f32;
    let mut prev: Option<GlyphId> = None;
    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(p) = prev {
            width += scaled.kern(p, id);
        }
        width += scaled.h_advance(id);
        prev = Some(id);
    }
    width
}

/// Measure the rendered sprite size of `text` in pixels, padding included.
///
/// Sizes too large for `u32` saturate at `u32::MAX`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn measure_text(font: &FontArc, text: &str, font_size_px: f32) -> (u32, u32) {
    let scale = em_scale(font, font_size_px);
    let scaled = font.as_scaled(scale);
    let width = advance_width(font, scale, text).ceil().max(0.0) as u32;
    let height = (scaled.ascent() - scaled.descent()).ceil().max(0.0) as u32;
    (
        width.saturating_add(2 * PADDING),
        height.saturating_add(2 * PADDING),
    )
}

/// Rasterize `text` at `font_size_px` in a solid `color`.
///
/// # Errors
///
/// Returns [`Error::InvalidSignature`] for empty text, a size outside
/// `(0, MAX_FONT_SIZE_PX]`, or text too long to rasterize in one sprite.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss
)]
pub fn render_text(
    font: &FontArc,
    text: &str,
    font_size_px: f32,
    color: Rgb<u8>,
) -> Result<TextSprite> {
    if text.is_empty() {
        return Err(Error::InvalidSignature("cannot render empty text".to_string()));
    }
    if !(font_size_px > 0.0 && font_size_px <= MAX_FONT_SIZE_PX) {
        return Err(Error::InvalidSignature(format!(
            "font size must be in (0, {MAX_FONT_SIZE_PX}], got {font_size_px}"
        )));
    }

    let scale = em_scale(font, font_size_px);
    let scaled = font.as_scaled(scale);
    let (width, height) = measure_text(font, text, font_size_px);
    let pixels = u64::from(width) * u64::from(height);
    if pixels > MAX_SPRITE_PIXELS {
        return Err(Error::InvalidSignature(format!(
            "text renders to {width}x{height} pixels, which is too large"
        )));
    }

    let origin_x = PADDING as f32;
    let baseline = PADDING as f32 + scaled.ascent();

    let mut coverage = vec![0.0f32; pixels as usize];
    let mut cursor_x = origin_x;
    let mut prev: Option<GlyphId> = None;

    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(p) = prev {
            cursor_x += scaled.kern(p, id);
        }

        let glyph = id.with_scale_and_position(scale, point(cursor_x, baseline));
        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|px, py, cov| {
                let x = px as i32 + bounds.min.x as i32;
                let y = py as i32 + bounds.min.y as i32;
                if x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height {
                    let cell = &mut coverage[(y as u32 * width + x as u32) as usize];
                    *cell = (*cell + cov).min(1.0);
                }
            });
        }

        cursor_x += scaled.h_advance(id);
        prev = Some(id);
    }

    let image = RgbaImage::from_fn(width, height, |x, y| {
        let c = coverage[(y * width + x) as usize];
        Rgba([color[0], color[1], color[2], (c * 255.0).round() as u8])
    });

    Ok(TextSprite {
        image,
        origin_x,
        baseline,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_font_loads() {
        assert!(default_font().is_ok());
    }

    #[test]
    fn load_font_rejects_garbage() {
        assert!(matches!(load_font(vec![0u8; 16]), Err(Error::Font(_))));
    }

    #[test]
    fn render_text_has_visible_glyphs_in_requested_color() {
        let font = default_font().unwrap();
        let sprite = render_text(&font, "Jane Doe", 32.0, Rgb([200, 10, 30])).unwrap();

        assert!(sprite.image.width() > 0);
        assert!(sprite.image.height() > 0);
        let inked: Vec<_> = sprite.image.pixels().filter(|p| p[3] > 0).collect();
        assert!(!inked.is_empty(), "rendered text should have visible pixels");
        assert!(inked.iter().all(|p| p[0] == 200 && p[1] == 10 && p[2] == 30));
    }

    #[test]
    fn baseline_sits_inside_sprite() {
        let font = default_font().unwrap();
        let sprite = render_text(&font, "Ag", 40.0, Rgb([0, 0, 0])).unwrap();
        #[allow(clippy::cast_precision_loss)]
        let h = sprite.image.height() as f32;
        assert!(sprite.baseline > 0.0 && sprite.baseline < h);
        let (left, top) = sprite.top_left_at(100.0, 100.0);
        assert!((left - (100.0 - sprite.origin_x)).abs() < f32::EPSILON);
        assert!((top - (100.0 - sprite.baseline)).abs() < f32::EPSILON);
    }

    #[test]
    fn font_size_affects_dimensions() {
        let font = default_font().unwrap();
        let (w1, h1) = measure_text(&font, "Hello", 12.0);
        let (w2, h2) = measure_text(&font, "Hello", 24.0);
        let (w3, h3) = measure_text(&font, "Hello", 48.0);
        assert!(w2 > w1 && w3 > w2);
        assert!(h2 > h1 && h3 > h2);
    }

    #[test]
    fn render_rejects_empty_text_and_bad_size() {
        let font = default_font().unwrap();
        assert!(render_text(&font, "", 24.0, Rgb([0, 0, 0])).is_err());
        assert!(render_text(&font, "x", 0.0, Rgb([0, 0, 0])).is_err());
        assert!(render_text(&font, "x", f32::NAN, Rgb([0, 0, 0])).is_err());
    }

    #[test]
    fn oversized_text_is_an_error_not_a_panic() {
        let font = default_font().unwrap();
        let white = Rgb([255, 255, 255]);
        assert!(matches!(
            render_text(&font, "Jane Doe", 200_000.0, white),
            Err(Error::InvalidSignature(_))
        ));
        assert!(matches!(
            render_text(&font, "Jane Doe", f32::INFINITY, white),
            Err(Error::InvalidSignature(_))
        ));
        let long = "W".repeat(100_000);
        assert!(matches!(
            render_text(&font, &long, MAX_FONT_SIZE_PX, white),
            Err(Error::InvalidSignature(_))
        ));
        assert!(render_text(&font, "J", MAX_FONT_SIZE_PX, white).is_ok());

        let (w, h) = measure_text(&font, &long, MAX_FONT_SIZE_PX);
        assert!(w > h);
    }
}
