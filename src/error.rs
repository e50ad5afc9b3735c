//! Error types for the artwork-guard crate.

/// Errors that can occur while compositing, encoding or exporting artwork.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The base image has a zero width or height.
    #[error("base image is empty ({width}x{height})")]
    EmptyImage {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
    },

    /// A tiling parameter is outside its accepted range.
    #[error("invalid {name}: {value} (expected {expected})")]
    InvalidParam {
        /// Parameter name.
        name: &'static str,
        /// The rejected value.
        value: f32,
        /// Human-readable accepted range.
        expected: &'static str,
    },

    /// The signature cannot be drawn (zero-sized raster, bad colour, ...).
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// The font data could not be parsed.
    #[error("failed to load font: {0}")]
    Font(String),

    /// The base image is not a supported raster format.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// The signature image is not a PNG.
    #[error("signature image must be a PNG (got {0})")]
    SignatureNotPng(String),

    /// Export was requested before the human verification gate passed.
    #[error("human verification has not been completed")]
    NotVerified,

    /// The steganographic encoder or decoder failed.
    #[error("steganography error: {0}")]
    Stego(#[from] StegoError),

    /// A background task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error occurred in the image codec (decode, encode).
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

/// Errors raised by the least-significant-bit payload codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StegoError {
    /// The carrier image has no pixels.
    #[error("carrier image is empty")]
    EmptyImage,

    /// The payload plus its length header does not fit in the carrier.
    #[error("payload needs {needed} bits but the image only holds {available}")]
    CapacityExceeded {
        /// Bits required by header and payload.
        needed: u64,
        /// Bits available in the carrier.
        available: u64,
    },

    /// The length header points past the end of the carrier.
    #[error("no payload found")]
    NoPayload,

    /// The extracted bytes are not valid UTF-8.
    #[error("extracted payload is not valid UTF-8")]
    InvalidUtf8,
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
