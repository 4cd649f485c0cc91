use sourcebox_shared::crypto::{self, SymmetricKey};
use zeroize::{Zeroize, Zeroizing};

use crate::error::Result;

/// 256-bit key that seals everything the client writes to a [`BlobStore`].
///
/// [`BlobStore`]: crate::BlobStore
#[derive(Clone)]
pub struct StorageKey(SymmetricKey);

impl StorageKey {
    pub fn generate() -> Self {
        Self(crypto::generate_symmetric_key())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// XChaCha20-Poly1305 with a random nonce prepended.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(crypto::encrypt(&self.0, plaintext)?)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(crypto::decrypt(&self.0, sealed)?))
    }
}

impl Drop for StorageKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StorageKey([REDACTED])")
    }
}
