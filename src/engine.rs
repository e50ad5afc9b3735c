//! Export pipeline: composite, hide the payload, encode as PNG.

use std::collections::HashSet;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{ImageFormat, RgbaImage};

use crate::compositor::Compositor;
use crate::error::{Error, Result};
use crate::params::{SignatureSpec, TileParams};
use crate::stego::{self, LsbEncoder, StegoEncoder};

/// Raster formats accepted for the base image.
const BASE_FORMATS: &[ImageFormat] = &[
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::WebP,
    ImageFormat::Bmp,
    ImageFormat::Tiff,
];

/// Options controlling how a file is processed.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Signature to tile. `None` skips the file.
    pub signature: Option<SignatureSpec>,
    /// Tiling parameters.
    pub params: TileParams,
    /// Whether the human verification gate has passed.
    pub verified: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            signature: None,
            params: TileParams::default(),
            verified: false,
        }
    }
}

/// Result of processing a single image file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Path of the processed file.
    pub path: PathBuf,
    /// Where the protected PNG was written, if anywhere.
    pub output: Option<PathBuf>,
    /// Whether processing succeeded.
    pub success: bool,
    /// Whether the file was skipped (no signature to draw).
    pub skipped: bool,
    /// Human-readable status message.
    pub message: String,
}

impl ProcessResult {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            output: None,
            success: false,
            skipped: false,
            message: String::new(),
        }
    }
}

/// A finished export: the PNG bytes and the name to offer them under.
#[derive(Debug, Clone)]
pub struct ExportedImage {
    /// `protected-artwork-<unix-ms>.png`.
    pub file_name: String,
    /// Lossless PNG encoding of [`ExportedImage::image`].
    pub png: Vec<u8>,
    /// The exported pixels.
    pub image: RgbaImage,
}

impl ExportedImage {
    /// Write the PNG into `dir` under [`ExportedImage::file_name`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory or file cannot be written.
    pub fn save_in(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.png)?;
        Ok(path)
    }
}

/// Composites signatures and exports protected PNGs.
///
/// Create once with [`WatermarkEngine::new()`] and reuse for multiple images.
pub struct WatermarkEngine {
    compositor: Compositor,
    encoder: Arc<dyn StegoEncoder>,
    payload: Option<String>,
}

impl std::fmt::Debug for WatermarkEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkEngine")
            .field("compositor", &self.compositor)
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

impl WatermarkEngine {
    /// Engine with the embedded font, the LSB encoder and a
    /// `"Copyright <current year>"` payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Font`] if the embedded font cannot be parsed.
    pub fn new() -> Result<Self> {
        Ok(Self {
            compositor: Compositor::new()?,
            encoder: Arc::new(LsbEncoder),
            payload: Some(stego::current_copyright_payload()),
        })
    }

    /// Replace the compositor (for a custom font).
    #[must_use]
    pub fn with_compositor(mut self, compositor: Compositor) -> Self {
        self.compositor = compositor;
        self
    }

    /// Replace the steganographic encoder.
    #[must_use]
    pub fn with_encoder(mut self, encoder: Arc<dyn StegoEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Set the hidden payload. `None` exports the plain composite.
    #[must_use]
    pub fn with_payload(mut self, payload: Option<String>) -> Self {
        self.payload = payload;
        self
    }

    /// The compositor in use.
    #[must_use]
    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    /// The hidden payload, if any.
    #[must_use]
    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    /// Composite without exporting (preview).
    ///
    /// # Errors
    ///
    /// See [`Compositor::composite`].
    pub fn composite(
        &self,
        base: &RgbaImage,
        signature: Option<&SignatureSpec>,
        params: &TileParams,
    ) -> Result<RgbaImage> {
        self.compositor.composite(base, signature, params)
    }

    /// Hide the payload in `image`, keeping `image` as-is on failure.
    #[must_use]
    pub fn embed(&self, image: &RgbaImage) -> RgbaImage {
        match &self.payload {
            Some(payload) => stego::encode_or_fallback(self.encoder.as_ref(), payload, image),
            None => image.clone(),
        }
    }

    /// Run the full export: verification gate, composite, payload, PNG.
    ///
    /// # Errors
    ///
    /// - [`Error::NotVerified`] if `verified` is false.
    /// - Any compositing error; payload failures never surface.
    pub fn export(
        &self,
        base: &RgbaImage,
        signature: Option<&SignatureSpec>,
        params: &TileParams,
        verified: bool,
    ) -> Result<ExportedImage> {
        if !verified {
            return Err(Error::NotVerified);
        }
        let composite = self.composite(base, signature, params)?;
        let image = self.embed(&composite);
        finish_export(image, chrono::Utc::now().timestamp_millis())
    }

    /// [`WatermarkEngine::export`] with compositing, payload encoding and PNG
    /// encoding on the blocking pool.
    ///
    /// # Errors
    ///
    /// Same as [`WatermarkEngine::export`], plus [`Error::Task`] if a worker
    /// task panics while compositing or encoding the PNG.
    pub async fn export_async(
        &self,
        base: Arc<RgbaImage>,
        signature: Option<SignatureSpec>,
        params: TileParams,
        verified: bool,
    ) -> Result<ExportedImage> {
        if !verified {
            return Err(Error::NotVerified);
        }

        let compositor = self.compositor.clone();
        let composite = tokio::task::spawn_blocking(move || {
            compositor.composite(&base, signature.as_ref(), &params)
        })
        .await??;

        let image = match &self.payload {
            Some(payload) => {
                stego::encode_async(Arc::clone(&self.encoder), payload.clone(), composite).await
            }
            None => composite,
        };

        let timestamp = chrono::Utc::now().timestamp_millis();
        tokio::task::spawn_blocking(move || finish_export(image, timestamp)).await?
    }

    /// Process a single image file: read, composite, embed, write PNG.
    ///
    /// Returns a [`ProcessResult`] indicating success, skip, or failure.
    #[must_use]
    pub fn process_file(&self, input: &Path, output: &Path, opts: &ProcessOptions) -> ProcessResult {
        let mut result = ProcessResult::new(input);

        let Some(signature) = opts.signature.as_ref().filter(|s| !s.is_blank()) else {
            result.skipped = true;
            result.success = true;
            result.message = "No signature supplied".to_string();
            return result;
        };

        let base = match std::fs::read(input)
            .map_err(Error::from)
            .and_then(|bytes| decode_base_image(&bytes))
        {
            Ok(img) => img,
            Err(e) => {
                result.message = format!("Failed to load: {e}");
                return result;
            }
        };

        let exported = match self.export(&base, Some(signature), &opts.params, opts.verified) {
            Ok(exported) => exported,
            Err(e) => {
                result.message = format!("Failed to protect: {e}");
                return result;
            }
        };

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    result.message = format!("Failed to create output directory: {e}");
                    return result;
                }
            }
        }

        match std::fs::write(output, &exported.png) {
            Ok(()) => {
                tracing::debug!(input = %input.display(), output = %output.display(), "exported");
                result.success = true;
                result.output = Some(output.to_path_buf());
                result.message = "Watermark applied".to_string();
            }
            Err(e) => {
                result.message = format!("Failed to save: {e}");
            }
        }

        result
    }

    /// Process all supported images in a directory.
    ///
    /// Uses parallel iteration when the `cli` feature is enabled (via rayon).
    /// Each output is named `protected-artwork-<unix-ms>-<input file name>.png`,
    /// so `cat.png` and `cat.bmp` land in different files. An input whose
    /// output name is already taken fails instead of overwriting.
    #[must_use]
    pub fn process_directory(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        opts: &ProcessOptions,
    ) -> Vec<ProcessResult> {
        let entries: Vec<PathBuf> = match std::fs::read_dir(input_dir) {
            Ok(rd) => rd
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
                .map(|e| e.path())
                .filter(|p| is_supported_image(p))
                .collect(),
            Err(e) => {
                let mut result = ProcessResult::new(input_dir);
                result.message = format!("Failed to read directory: {e}");
                return vec![result];
            }
        };

        if let Err(e) = std::fs::create_dir_all(output_dir) {
            let mut result = ProcessResult::new(output_dir);
            result.message = format!("Failed to create output directory: {e}");
            return vec![result];
        }

        let timestamp = chrono::Utc::now().timestamp_millis();
        let jobs: Vec<(PathBuf, PathBuf)> = entries
            .into_iter()
            .map(|input| {
                let name = input.file_name().unwrap_or_default().to_string_lossy();
                let output = output_dir.join(batch_file_name(timestamp, &name));
                (input, output)
            })
            .collect();

        let run = |(input, output): &(PathBuf, PathBuf), duplicate: bool| {
            if duplicate {
                let mut result = ProcessResult::new(input);
                result.message = format!(
                    "Output name {} is already used by another input",
                    output.display()
                );
                return result;
            }
            self.process_file(input, output, opts)
        };
        let mut claimed = HashSet::new();
        let duplicates: Vec<bool> = jobs
            .iter()
            .map(|(_, output)| !claimed.insert(output.clone()))
            .collect();

        #[cfg(feature = "cli")]
        {
            use rayon::prelude::*;
            jobs.par_iter()
                .zip(duplicates)
                .map(|(job, duplicate)| run(job, duplicate))
                .collect()
        }

        #[cfg(not(feature = "cli"))]
        {
            jobs.iter()
                .zip(duplicates)
                .map(|(job, duplicate)| run(job, duplicate))
                .collect()
        }
    }
}

fn finish_export(image: RgbaImage, timestamp_ms: i64) -> Result<ExportedImage> {
    let png = encode_png(&image)?;
    Ok(ExportedImage {
        file_name: export_file_name(timestamp_ms),
        png,
        image,
    })
}

/// Encode an image as PNG.
///
/// # Errors
///
/// Returns [`Error::Image`] if encoding fails.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Decode a base image, accepting common raster formats only.
///
/// # Errors
///
/// - [`Error::UnsupportedFormat`] if the bytes are not a supported raster.
/// - [`Error::Image`] if decoding fails.
/// - [`Error::EmptyImage`] if the decoded image has no pixels.
pub fn decode_base_image(bytes: &[u8]) -> Result<RgbaImage> {
    let format = image::guess_format(bytes)
        .map_err(|_| Error::UnsupportedFormat("unrecognized data".to_string()))?;
    if !BASE_FORMATS.contains(&format) {
        return Err(Error::UnsupportedFormat(format.to_mime_type().to_string()));
    }

    let img = image::load_from_memory_with_format(bytes, format)?.to_rgba8();
    if img.width() == 0 || img.height() == 0 {
        return Err(Error::EmptyImage {
            width: img.width(),
            height: img.height(),
        });
    }
    Ok(img)
}

/// Decode a signature image. Only PNG is accepted, so transparency survives.
///
/// # Errors
///
/// - [`Error::SignatureNotPng`] for any other format.
/// - [`Error::Image`] if decoding fails.
pub fn decode_signature_image(bytes: &[u8]) -> Result<RgbaImage> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => {
            Ok(image::load_from_memory_with_format(bytes, ImageFormat::Png)?.to_rgba8())
        }
        Ok(other) => Err(Error::SignatureNotPng(other.to_mime_type().to_string())),
        Err(_) => Err(Error::SignatureNotPng("unrecognized data".to_string())),
    }
}

/// Check if a file has a supported base-image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" | "tif" | "tiff"
        ),
        None => false,
    }
}

/// Download name for an export: `protected-artwork-<unix-ms>.png`.
#[must_use]
pub fn export_file_name(timestamp_ms: i64) -> String {
    format!("protected-artwork-{timestamp_ms}.png")
}

/// Name for one file of a directory batch, which shares a single timestamp.
///
/// The whole source file name, extension included, is kept.
#[must_use]
pub fn batch_file_name(timestamp_ms: i64, source_name: &str) -> String {
    format!("protected-artwork-{timestamp_ms}-{source_name}.png")
}
