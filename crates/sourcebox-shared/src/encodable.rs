//! Canonical unencrypted byte representation for everything that gets boxed.

use crate::error::EncodingError;

/// A value with a canonical byte encoding.
///
/// Every payload carried by [`AnonymousBox`](crate::crypto::AnonymousBox),
/// [`TwoPartyBox`](crate::crypto::TwoPartyBox) and
/// [`MultiAnonymousBox`](crate::crypto::MultiAnonymousBox) implements this.
/// Decoding runs on freshly decrypted bytes, so it must reject anything
/// malformed instead of panicking.
pub trait Encodable: Sized {
    fn as_unencrypted_bytes(&self) -> Vec<u8>;

    fn from_unencrypted_bytes(bytes: &[u8]) -> Result<Self, EncodingError>;
}

impl Encodable for Vec<u8> {
    fn as_unencrypted_bytes(&self) -> Vec<u8> {
        self.clone()
    }

    fn from_unencrypted_bytes(bytes: &[u8]) -> Result<Self, EncodingError> {
        Ok(bytes.to_vec())
    }
}

impl Encodable for String {
    fn as_unencrypted_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    fn from_unencrypted_bytes(bytes: &[u8]) -> Result<Self, EncodingError> {
        String::from_utf8(bytes.to_vec()).map_err(|_| EncodingError::InvalidPaddedString)
    }
}

/// Copy `bytes` into a fixed-size array, failing on any length mismatch.
pub(crate) fn fixed_bytes<const N: usize>(bytes: &[u8]) -> Result<[u8; N], EncodingError> {
    bytes.try_into().map_err(|_| EncodingError::InvalidLength {
        expected: N,
        actual: bytes.len(),
    })
}
