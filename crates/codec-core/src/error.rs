//! Error types for codec operations.

use thiserror::Error;

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors that can occur while encoding, decoding, or framing audio.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A PCM frame was not a multiple of 2 bytes (not whole 16-bit samples).
    #[error("invalid PCM frame length: {0} bytes is not a whole number of samples")]
    InvalidFrameLength(usize),

    /// A WAV header failed to parse or described an unsupported format.
    #[error("invalid WAV data: {0}")]
    InvalidWav(String),

    /// Base64 input could not be decoded.
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),
}
