//! Protect artwork with a tiled visible watermark and a hidden copyright payload.
//!
//! A text or translucent image signature is stamped across the base image on a
//! rotated grid at a chosen opacity. On export, a short `"Copyright <year>"`
//! string is hidden in the least-significant bits of the composite before it is
//! encoded as PNG.
//!
//! # Quick Start
//!
//! ```no_run
//! use artwork_guard::{SignatureSpec, TileParams, WatermarkEngine};
//! use image::Rgb;
//!
//! let engine = WatermarkEngine::new().expect("failed to init engine");
//! let base = image::open("artwork.jpg").unwrap().to_rgba8();
//! let signature = SignatureSpec::text("Jane Doe", 48.0, Rgb([255, 255, 255]));
//! let exported = engine
//!     .export(&base, Some(&signature), &TileParams::default(), true)
//!     .unwrap();
//! exported.save_in(std::path::Path::new(".")).unwrap();
//! ```
//!
//! # Preview
//!
//! [`PreviewSession`] recomposites from the original base image on every
//! parameter change and drops results that were overtaken by a newer request.
//!
//! ```no_run
//! # async fn demo(base: std::sync::Arc<image::RgbaImage>) -> artwork_guard::Result<()> {
//! use std::sync::Arc;
//! use artwork_guard::{PreviewSession, SignatureSpec, TileParams, WatermarkEngine};
//!
//! let session = PreviewSession::new(Arc::new(WatermarkEngine::new()?));
//! let signature = SignatureSpec::text("Jane Doe", 32.0, image::Rgb([0, 0, 0]));
//! if let Some(preview) = session.render(base, Some(signature), TileParams::default()).await? {
//!     println!("{}x{}", preview.width(), preview.height());
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

pub mod blending;
pub mod compositor;
mod engine;
pub mod error;
mod params;
mod session;
pub mod stego;
pub mod text;

pub use compositor::{composite, raster_tile_size, tile_origins, Compositor};
pub use engine::{
    batch_file_name, decode_base_image, decode_signature_image, encode_png, export_file_name,
    is_supported_image, ExportedImage, ProcessOptions, ProcessResult, WatermarkEngine,
};
pub use error::{Error, Result, StegoError};
pub use params::{
    parse_hex_color, SignatureSpec, TextSignature, TileParams, MAX_DENSITY, MAX_OPACITY, MIN_OPACITY,
};
pub use session::{PreviewSession, DEFAULT_SETTLE_DELAY};
pub use stego::{LsbEncoder, StegoEncoder};
