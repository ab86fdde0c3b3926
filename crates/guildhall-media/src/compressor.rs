//! Bounded-attempt compression to a byte budget.

use tracing::debug;

use crate::codec::{JpegCodec, Transcoder};
use crate::error::{MediaError, MediaResult};

/// Byte budget for avatar uploads.
pub const MAX_AVATAR_BYTES: usize = 1024 * 1024;

/// Quality used by each attempt, in order. One attempt per rung.
pub const QUALITY_LADDER: [u8; 5] = [90, 70, 50, 30, 10];

/// One encoding attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionAttempt {
    /// Zero-based attempt index.
    pub attempt_index: usize,
    /// Quality the attempt encoded at.
    pub quality: u8,
    /// Size of the attempt's output.
    pub result_size_bytes: usize,
}

/// Output of a successful compression.
#[derive(Debug, Clone)]
pub struct Compressed {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    /// Every attempt made, the last one being the accepted output.
    pub attempts: Vec<CompressionAttempt>,
}

/// Re-encodes an image at decreasing quality until it fits a byte budget.
///
/// Every attempt starts from the decoded original, never from a previous
/// attempt's output.
#[derive(Debug, Clone, Default)]
pub struct MediaCompressor<T = JpegCodec> {
    codec: T,
}

impl MediaCompressor<JpegCodec> {
    pub fn jpeg() -> Self {
        Self::new(JpegCodec::default())
    }
}

impl<T: Transcoder> MediaCompressor<T> {
    pub fn new(codec: T) -> Self {
        Self { codec }
    }

    /// Compresses `input` to at most `target_bytes`.
    ///
    /// Fails with [`MediaError::SizeExceeded`] after the last rung of
    /// [`QUALITY_LADDER`] if nothing fits.
    pub fn compress(&self, input: &[u8], target_bytes: usize) -> MediaResult<Compressed> {
        let image = self.codec.decode(input)?;
        let mut attempts = Vec::with_capacity(QUALITY_LADDER.len());
        let mut smallest = usize::MAX;

        for (attempt_index, &quality) in QUALITY_LADDER.iter().enumerate() {
            let bytes = self.codec.encode(&image, quality)?;
            let attempt = CompressionAttempt {
                attempt_index,
                quality,
                result_size_bytes: bytes.len(),
            };
            debug!(
                attempt = attempt_index + 1,
                quality,
                size = bytes.len(),
                target = target_bytes,
                "compression attempt"
            );
            attempts.push(attempt);
            smallest = smallest.min(bytes.len());

            if bytes.len() <= target_bytes {
                return Ok(Compressed {
                    bytes,
                    mime: self.codec.mime(),
                    attempts,
                });
            }
        }

        Err(MediaError::SizeExceeded {
            target: target_bytes,
            smallest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Produces output whose size is a function of the quality and records
    /// every quality it was asked for.
    struct SizedCodec {
        size_at: fn(u8) -> usize,
        decodes: Mutex<usize>,
        qualities: Mutex<Vec<u8>>,
    }

    impl SizedCodec {
        fn new(size_at: fn(u8) -> usize) -> Self {
            Self {
                size_at,
                decodes: Mutex::new(0),
                qualities: Mutex::new(Vec::new()),
            }
        }
    }

    impl Transcoder for SizedCodec {
        type Image = usize;

        fn decode(&self, input: &[u8]) -> MediaResult<usize> {
            *self.decodes.lock() += 1;
            Ok(input.len())
        }

        fn encode(&self, _image: &usize, quality: u8) -> MediaResult<Vec<u8>> {
            self.qualities.lock().push(quality);
            Ok(vec![0; (self.size_at)(quality)])
        }

        fn mime(&self) -> &'static str {
            "image/test"
        }
    }

    const TWO_MIB: usize = 2 * 1024 * 1024;

    #[test]
    fn walks_the_ladder_until_it_fits() {
        let compressor = MediaCompressor::new(SizedCodec::new(|q| q as usize * 20_000));
        let out = compressor.compress(&vec![0; TWO_MIB], MAX_AVATAR_BYTES).unwrap();

        assert!(out.bytes.len() <= MAX_AVATAR_BYTES);
        assert_eq!(*compressor.codec.qualities.lock(), [90, 70, 50]);
        assert_eq!(out.attempts.len(), 3);
        assert_eq!(out.attempts[2].result_size_bytes, 1_000_000);
        assert_eq!(*compressor.codec.decodes.lock(), 1);
    }

    #[test]
    fn incompressible_input_fails_after_five_attempts() {
        let compressor = MediaCompressor::new(SizedCodec::new(|q| TWO_MIB + q as usize));
        let err = compressor
            .compress(&vec![0; TWO_MIB], MAX_AVATAR_BYTES)
            .unwrap_err();

        assert_eq!(*compressor.codec.qualities.lock(), QUALITY_LADDER);
        assert_eq!(
            err,
            MediaError::SizeExceeded {
                target: MAX_AVATAR_BYTES,
                smallest: TWO_MIB + 10,
            }
        );
    }

    #[test]
    fn small_input_stops_after_first_attempt() {
        let compressor = MediaCompressor::new(SizedCodec::new(|_| 10));
        let out = compressor.compress(b"tiny", MAX_AVATAR_BYTES).unwrap();
        assert_eq!(out.attempts.len(), 1);
        assert_eq!(out.attempts[0].quality, 90);
        assert_eq!(out.mime, "image/test");
    }

    #[test]
    fn ladder_is_strictly_decreasing() {
        assert!(QUALITY_LADDER.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn real_jpeg_fits_budget() {
        use image::{DynamicImage, ImageFormat, RgbImage};
        use std::io::Cursor;

        let img = RgbImage::from_fn(1500, 900, |x, y| {
            image::Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut png = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut png, ImageFormat::Png)
            .unwrap();

        let out = MediaCompressor::jpeg()
            .compress(&png.into_inner(), MAX_AVATAR_BYTES)
            .unwrap();
        assert!(out.bytes.len() <= MAX_AVATAR_BYTES);
        assert_eq!(out.mime, "image/jpeg");
    }
}
