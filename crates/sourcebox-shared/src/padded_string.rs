use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::constants::{MAX_DECOMPRESSION_RATIO, MESSAGE_PADDING_LEN, PADDED_STRING_HEADER_LEN};
use crate::crypto::fill_random;
use crate::encodable::Encodable;
use crate::error::EncodingError;

const MAX_COMPRESSED_LEN: usize = MESSAGE_PADDING_LEN - PADDED_STRING_HEADER_LEN;

/// Text compressed and padded to exactly [`MESSAGE_PADDING_LEN`] bytes.
///
/// Layout: `u16 BE compressed length || gzip bytes || random padding`.
#[derive(Clone, PartialEq, Eq)]
pub struct PaddedCompressedString(Vec<u8>);

impl PaddedCompressedString {
    pub fn from_string(text: &str) -> Result<Self, EncodingError> {
        let compressed = compress(text)?;
        if compressed.len() > MAX_COMPRESSED_LEN {
            return Err(EncodingError::CompressedStringTooLong {
                len: compressed.len(),
                max: MAX_COMPRESSED_LEN,
            });
        }

        let mut bytes = vec![0u8; MESSAGE_PADDING_LEN];
        bytes[..PADDED_STRING_HEADER_LEN].copy_from_slice(&(compressed.len() as u16).to_be_bytes());
        let body_end = PADDED_STRING_HEADER_LEN + compressed.len();
        bytes[PADDED_STRING_HEADER_LEN..body_end].copy_from_slice(&compressed);
        fill_random(&mut bytes[body_end..]);

        Ok(Self(bytes))
    }

    /// Like [`from_string`](Self::from_string), also reporting how much of
    /// the padding budget the text uses, between 0.0 and 1.0.
    pub fn from_string_with_fill_level(text: &str) -> Result<(Self, f32), EncodingError> {
        let padded = Self::from_string(text)?;
        let fill_level = padded.fill_level();
        Ok((padded, fill_level))
    }

    pub fn fill_level(&self) -> f32 {
        let used = self.compressed_len().unwrap_or(MAX_COMPRESSED_LEN) + PADDED_STRING_HEADER_LEN;
        used as f32 / MESSAGE_PADDING_LEN as f32
    }

    pub fn to_string(&self) -> Result<String, EncodingError> {
        let compressed_len = self.compressed_len().ok_or(EncodingError::InvalidPaddedString)?;
        let compressed =
            &self.0[PADDED_STRING_HEADER_LEN..PADDED_STRING_HEADER_LEN + compressed_len];

        // Read one byte past the allowed maximum so an overshoot is detectable
        let limit = compressed_len * MAX_DECOMPRESSION_RATIO;
        let mut decompressed = Vec::new();
        GzDecoder::new(compressed)
            .take(limit as u64 + 1)
            .read_to_end(&mut decompressed)
            .map_err(|_| EncodingError::InvalidPaddedString)?;

        if decompressed.len() > limit {
            return Err(EncodingError::DecompressionRatioTooHigh);
        }

        String::from_utf8(decompressed).map_err(|_| EncodingError::InvalidPaddedString)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn compressed_len(&self) -> Option<usize> {
        let header: [u8; PADDED_STRING_HEADER_LEN] =
            self.0.get(..PADDED_STRING_HEADER_LEN)?.try_into().ok()?;
        let len = u16::from_be_bytes(header) as usize;
        (len > 0 && len <= MAX_COMPRESSED_LEN).then_some(len)
    }
}

fn compress(text: &str) -> Result<Vec<u8>, EncodingError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(text.as_bytes())?;
    Ok(encoder.finish()?)
}

impl Encodable for PaddedCompressedString {
    fn as_unencrypted_bytes(&self) -> Vec<u8> {
        self.0.clone()
    }

    fn from_unencrypted_bytes(bytes: &[u8]) -> Result<Self, EncodingError> {
        if bytes.len() != MESSAGE_PADDING_LEN {
            return Err(EncodingError::InvalidLength {
                expected: MESSAGE_PADDING_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self(bytes.to_vec()))
    }
}

impl std::fmt::Debug for PaddedCompressedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaddedCompressedString")
            .field("compressed_len", &self.compressed_len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use rand::distributions::Alphanumeric;
    use rand::Rng;

    use super::*;

    #[test]
    fn test_roundtrip() {
        let padded = PaddedCompressedString::from_string("hello").unwrap();
        assert_eq!(padded.as_bytes().len(), MESSAGE_PADDING_LEN);
        assert_eq!(padded.to_string().unwrap(), "hello");
    }

    #[test]
    fn test_empty_and_unicode_text() {
        for text in ["", "Grüße aus der Redaktion 📰"] {
            let padded = PaddedCompressedString::from_string(text).unwrap();
            assert_eq!(padded.to_string().unwrap(), text);
        }
    }

    #[test]
    fn test_compressible_long_text_fits() {
        let text = "the quick brown fox ".repeat(40);
        let padded = PaddedCompressedString::from_string(&text).unwrap();
        assert_eq!(padded.to_string().unwrap(), text);
    }

    #[test]
    fn test_incompressible_text_too_long() {
        let text: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(400)
            .map(char::from)
            .collect();
        let result = PaddedCompressedString::from_string(&text);
        assert!(matches!(
            result,
            Err(EncodingError::CompressedStringTooLong { max: MAX_COMPRESSED_LEN, .. })
        ));
    }

    #[test]
    fn test_decompression_bomb_rejected() {
        let padded = PaddedCompressedString::from_string(&"a".repeat(30_000)).unwrap();
        assert!(matches!(padded.to_string(), Err(EncodingError::DecompressionRatioTooHigh)));
    }

    #[test]
    fn test_header_past_buffer_rejected() {
        let mut bytes = PaddedCompressedString::from_string("hello").unwrap().as_unencrypted_bytes();
        bytes[..2].copy_from_slice(&(MESSAGE_PADDING_LEN as u16).to_be_bytes());
        let padded = PaddedCompressedString::from_unencrypted_bytes(&bytes).unwrap();
        assert!(matches!(padded.to_string(), Err(EncodingError::InvalidPaddedString)));

        bytes[..2].copy_from_slice(&0u16.to_be_bytes());
        let padded = PaddedCompressedString::from_unencrypted_bytes(&bytes).unwrap();
        assert!(matches!(padded.to_string(), Err(EncodingError::InvalidPaddedString)));
    }

    #[test]
    fn test_wrong_length_rejected() {
        let result = PaddedCompressedString::from_unencrypted_bytes(&[0u8; 255]);
        assert!(matches!(result, Err(EncodingError::InvalidLength { expected: 256, actual: 255 })));
    }

    #[test]
    fn test_padding_is_random() {
        let a = PaddedCompressedString::from_string("hello").unwrap();
        let b = PaddedCompressedString::from_string("hello").unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_fill_level() {
        let (_, short) = PaddedCompressedString::from_string_with_fill_level("hi").unwrap();
        let (_, long) =
            PaddedCompressedString::from_string_with_fill_level(&"varied words here 1234 ".repeat(6))
                .unwrap();
        assert!(short > 0.0 && short < long && long <= 1.0);
    }
}
