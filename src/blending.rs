//! Alpha blending math for stamping signatures onto the working surface.
//!
//! Tiles are composited with the Porter-Duff "over" operator:
//! `out = src * a * opacity + dst * (1 - a * opacity)`
//!
//! Sprites are placed in a rotated coordinate space. Every device pixel in the
//! rotated bounding box is inverse-mapped into sprite space through its center
//! and sampled bilinearly with premultiplied alpha, so glyph edges stay clean
//! at any angle.

use image::{Rgba, RgbaImage};

/// Sampled alpha below this contributes nothing visible.
const ALPHA_EPSILON: f32 = 1.0 / 1024.0;

/// A rotation about the surface origin, clockwise on screen (y points down).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    cos: f32,
    sin: f32,
}

impl Rotation {
    /// Rotation by `radians`.
    #[must_use]
    pub fn new(radians: f32) -> Self {
        Self {
            cos: radians.cos(),
            sin: radians.sin(),
        }
    }

    /// Map a point from rotated space to device space.
    #[must_use]
    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.cos - y * self.sin, x * self.sin + y * self.cos)
    }

    /// Map a device point back into rotated space.
    #[must_use]
    pub fn invert(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.cos + y * self.sin, -x * self.sin + y * self.cos)
    }
}

/// Blend a premultiplied source sample onto a straight-alpha destination pixel.
///
/// `src` holds premultiplied RGB and alpha, all in `[0, 1]`. `opacity` scales
/// the whole sample.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn blend_over(dst: Rgba<u8>, src: [f32; 4], opacity: f32) -> Rgba<u8> {
    let opacity = opacity.clamp(0.0, 1.0);
    let sa = src[3] * opacity;
    if sa < ALPHA_EPSILON {
        return dst;
    }

    let da = f32::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a < ALPHA_EPSILON {
        return Rgba([0, 0, 0, 0]);
    }

    let channel = |ch: usize| -> u8 {
        let d = f32::from(dst[ch]) / 255.0;
        let premul = src[ch] * opacity + d * da * (1.0 - sa);
        ((premul / out_a).clamp(0.0, 1.0) * 255.0).round() as u8
    };

    Rgba([
        channel(0),
        channel(1),
        channel(2),
        (out_a.clamp(0.0, 1.0) * 255.0).round() as u8,
    ])
}

/// Bilinear sample of `sprite` at continuous texel coordinates.
///
/// Texel `(i, j)` has its center at `(i, j)`. Outside the sprite everything is
/// transparent. Returns premultiplied RGB and alpha in `[0, 1]`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]
fn sample_premultiplied(sprite: &RgbaImage, sx: f32, sy: f32) -> [f32; 4] {
    let x0 = sx.floor();
    let y0 = sy.floor();
    let fx = sx - x0;
    let fy = sy - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);
    let (w, h) = (i64::from(sprite.width()), i64::from(sprite.height()));

    let mut acc = [0.0f32; 4];
    for (dx, dy, weight) in [
        (0, 0, (1.0 - fx) * (1.0 - fy)),
        (1, 0, fx * (1.0 - fy)),
        (0, 1, (1.0 - fx) * fy),
        (1, 1, fx * fy),
    ] {
        let (x, y) = (x0 + dx, y0 + dy);
        if weight <= 0.0 || x < 0 || y < 0 || x >= w || y >= h {
            continue;
        }
        let px = sprite.get_pixel(x as u32, y as u32);
        let a = f32::from(px[3]) / 255.0 * weight;
        acc[0] += f32::from(px[0]) / 255.0 * a;
        acc[1] += f32::from(px[1]) / 255.0 * a;
        acc[2] += f32::from(px[2]) / 255.0 * a;
        acc[3] += a;
    }
    acc
}

/// Device-space pixel bounds touched by a sprite, clipped to the surface.
///
/// Returns `(x0, y0, x1, y1)` with exclusive upper bounds, or `None` when the
/// sprite lies entirely off-surface.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn device_bounds(
    surface_width: u32,
    surface_height: u32,
    sprite_width: u32,
    sprite_height: u32,
    left: f32,
    top: f32,
    rotation: Rotation,
) -> Option<(u32, u32, u32, u32)> {
    let right = left + sprite_width as f32;
    let bottom = top + sprite_height as f32;
    let corners = [
        rotation.apply(left, top),
        rotation.apply(right, top),
        rotation.apply(left, bottom),
        rotation.apply(right, bottom),
    ];

    let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
    let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
    for (x, y) in corners {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }

    // One pixel of slack for the bilinear footprint.
    let x0 = (min_x.floor() - 1.0).max(0.0);
    let y0 = (min_y.floor() - 1.0).max(0.0);
    let x1 = (max_x.ceil() + 1.0).min(surface_width as f32);
    let y1 = (max_y.ceil() + 1.0).min(surface_height as f32);
    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
}

/// Interval of `t` where `lo < a + b * t < hi`, or `None` if it is empty.
fn linear_interval(a: f32, b: f32, lo: f32, hi: f32) -> Option<(f32, f32)> {
    if b.abs() < f32::EPSILON {
        return (lo < a && a < hi).then_some((f32::NEG_INFINITY, f32::INFINITY));
    }
    let t0 = (lo - a) / b;
    let t1 = (hi - a) / b;
    Some((t0.min(t1), t0.max(t1)))
}

/// Columns of row `y` whose pixel centers map inside the sprite's bilinear
/// footprint, clipped to `x_range`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::too_many_arguments
)]
fn row_span(
    y: u32,
    x_range: (u32, u32),
    sprite_width: u32,
    sprite_height: u32,
    left: f32,
    top: f32,
    rotation: Rotation,
) -> Option<(u32, u32)> {
    let cy = y as f32 + 0.5;
    // Sprite coordinates along the row, as functions of the pixel center xc:
    //   u = xc * cos + cy * sin - left - 0.5
    //   v = -xc * sin + cy * cos - top - 0.5
    let (u0, u1) = linear_interval(
        cy * rotation.sin - left - 0.5,
        rotation.cos,
        -1.0,
        sprite_width as f32,
    )?;
    let (v0, v1) = linear_interval(
        cy * rotation.cos - top - 0.5,
        -rotation.sin,
        -1.0,
        sprite_height as f32,
    )?;
    let lo = u0.max(v0) - 0.5;
    let hi = u1.min(v1) - 0.5;
    if lo > hi {
        return None;
    }

    // One column of slack on either side absorbs rounding.
    let x0 = (lo.floor() - 1.0).max(x_range.0 as f32);
    let x1 = (hi.ceil() + 2.0).min(x_range.1 as f32);
    (x0 < x1).then(|| (x0 as u32, x1 as u32))
}

/// Blend one surface row of a rotated sprite.
#[allow(clippy::cast_precision_loss, clippy::too_many_arguments)]
fn blend_row(
    row: &mut [u8],
    y: u32,
    x_range: (u32, u32),
    sprite: &RgbaImage,
    left: f32,
    top: f32,
    rotation: Rotation,
    opacity: f32,
) {
    let Some(x_range) = row_span(
        y,
        x_range,
        sprite.width(),
        sprite.height(),
        left,
        top,
        rotation,
    ) else {
        return;
    };
    let cy = y as f32 + 0.5;
    for x in x_range.0..x_range.1 {
        let (u, v) = rotation.invert(x as f32 + 0.5, cy);
        let src = sample_premultiplied(sprite, u - left - 0.5, v - top - 0.5);
        if src[3] < ALPHA_EPSILON {
            continue;
        }
        let i = x as usize * 4;
        let dst = Rgba([row[i], row[i + 1], row[i + 2], row[i + 3]]);
        let out = blend_over(dst, src, opacity);
        row[i..i + 4].copy_from_slice(&out.0);
    }
}

/// Stamp `sprite` onto `surface` with its top-left corner at `(left, top)` in
/// rotated space.
///
/// Only the sprite's rotated bounding box, clipped to the surface, is visited,
/// and within each row only the columns that land on the sprite.
/// Rows are blended in parallel when the `cli` feature is enabled; the result
/// is identical either way.
pub fn draw_sprite_rotated(
    surface: &mut RgbaImage,
    sprite: &RgbaImage,
    left: f32,
    top: f32,
    rotation: Rotation,
    opacity: f32,
) {
    let (width, height) = surface.dimensions();
    let Some((x0, y0, x1, y1)) = device_bounds(
        width,
        height,
        sprite.width(),
        sprite.height(),
        left,
        top,
        rotation,
    ) else {
        return;
    };

    let stride = width as usize * 4;
    let raw: &mut [u8] = surface;
    let rows = &mut raw[y0 as usize * stride..y1 as usize * stride];

    #[cfg(feature = "cli")]
    {
        use rayon::prelude::*;
        rows.par_chunks_mut(stride)
            .zip(y0..y1)
            .for_each(|(row, y)| {
                blend_row(row, y, (x0, x1), sprite, left, top, rotation, opacity);
            });
    }

    #[cfg(not(feature = "cli"))]
    {
        for (row, y) in rows.chunks_mut(stride).zip(y0..y1) {
            blend_row(row, y, (x0, x1), sprite, left, top, rotation, opacity);
        }
    }
}
