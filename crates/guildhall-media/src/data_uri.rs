//! Base64 and data-URI helpers for image payloads.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::{MediaError, MediaResult};

/// Decodes raw base64 or a `data:<mime>;base64,<payload>` URI.
pub fn decode(input: &str) -> MediaResult<Vec<u8>> {
    let payload = match input.trim().strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest
                .split_once(',')
                .ok_or_else(|| MediaError::InvalidEncoding("data URI has no payload".into()))?;
            if !header.ends_with(";base64") {
                return Err(MediaError::InvalidEncoding(
                    "data URI is not base64 encoded".into(),
                ));
            }
            payload
        }
        None => input.trim(),
    };
    BASE64
        .decode(payload)
        .map_err(|e| MediaError::InvalidEncoding(e.to_string()))
}

/// Encodes bytes as a `data:` URI.
pub fn encode(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", BASE64.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_raw_base64_and_data_uri() {
        assert_eq!(decode("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode("data:image/png;base64,aGVsbG8=").unwrap(), b"hello");
    }

    #[test]
    fn rejects_non_base64_data_uri() {
        assert!(matches!(
            decode("data:text/plain,hello"),
            Err(MediaError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn encodes_with_mime() {
        assert_eq!(encode("image/jpeg", b"hello"), "data:image/jpeg;base64,aGVsbG8=");
    }
}
