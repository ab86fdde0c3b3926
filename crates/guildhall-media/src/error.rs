use thiserror::Error;

/// Errors from media decoding, encoding and compression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// The input is not a readable image.
    #[error("failed to decode image: {0}")]
    Decode(String),

    /// The encoder rejected the image.
    #[error("failed to encode image: {0}")]
    Encode(String),

    /// The input is not valid base64 or data-URI text.
    #[error("invalid image encoding: {0}")]
    InvalidEncoding(String),

    /// Even the lowest quality setting did not fit the byte budget.
    #[error("image could not be compressed below {target} bytes (smallest attempt: {smallest} bytes)")]
    SizeExceeded {
        /// Byte budget.
        target: usize,
        /// Size of the smallest encoding produced.
        smallest: usize,
    },
}

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

impl From<image::ImageError> for MediaError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Encoding(e) => Self::Encode(e.to_string()),
            other => Self::Decode(other.to_string()),
        }
    }
}
