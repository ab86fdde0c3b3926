//! # Guildhall Media
//!
//! Fits uploaded images into the platform's byte budget.
//!
//! [`MediaCompressor`] decodes the input once, bounds it to
//! [`MAX_DIMENSION`] pixels per edge and then re-encodes it along the fixed
//! [`QUALITY_LADDER`] until an encoding fits, failing with
//! [`MediaError::SizeExceeded`] otherwise.

pub mod codec;
pub mod compressor;
pub mod data_uri;
pub mod error;

pub use codec::{JpegCodec, MAX_DIMENSION, Transcoder, fit_within};
pub use compressor::{
    CompressionAttempt, Compressed, MAX_AVATAR_BYTES, MediaCompressor, QUALITY_LADDER,
};
pub use error::{MediaError, MediaResult};
