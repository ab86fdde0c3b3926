//! Image codecs used by the compressor.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use crate::error::MediaResult;

/// Longest edge, in pixels, of any image the compressor emits.
pub const MAX_DIMENSION: u32 = 1024;

/// Decodes an input once and re-encodes it at a requested quality.
pub trait Transcoder: Send + Sync {
    /// Decoded, already size-bounded image.
    type Image;

    /// Decodes `input` and fits it inside the codec's dimension bound.
    fn decode(&self, input: &[u8]) -> MediaResult<Self::Image>;

    /// Encodes `image` at `quality` (1-100).
    fn encode(&self, image: &Self::Image, quality: u8) -> MediaResult<Vec<u8>>;

    /// MIME type of the encoded output.
    fn mime(&self) -> &'static str;
}

/// JPEG output via the `image` crate. Accepts any input format the crate
/// was built with.
#[derive(Debug, Clone, Copy)]
pub struct JpegCodec {
    max_dimension: u32,
}

impl JpegCodec {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self::new(MAX_DIMENSION)
    }
}

impl Transcoder for JpegCodec {
    type Image = DynamicImage;

    fn decode(&self, input: &[u8]) -> MediaResult<DynamicImage> {
        let image = image::load_from_memory(input)?;
        Ok(fit_within(image, self.max_dimension))
    }

    fn encode(&self, image: &DynamicImage, quality: u8) -> MediaResult<Vec<u8>> {
        let mut out = Cursor::new(Vec::new());
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
        encoder.encode_image(&image.to_rgb8())?;
        Ok(out.into_inner())
    }

    fn mime(&self) -> &'static str {
        "image/jpeg"
    }
}

/// Shrinks `image` so neither edge exceeds `max`, keeping the aspect ratio.
/// Smaller images are returned untouched.
pub fn fit_within(image: DynamicImage, max: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width <= max && height <= max {
        return image;
    }
    image.resize(max, max, FilterType::Triangle)
}
