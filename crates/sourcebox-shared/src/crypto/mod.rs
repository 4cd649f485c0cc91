mod anonymous_box;
mod multi_anonymous_box;
mod two_party_box;

pub use anonymous_box::AnonymousBox;
pub use multi_anonymous_box::{MultiAnonymousBox, SecretBoxKey};
pub use two_party_box::TwoPartyBox;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;

use crate::constants::{NONCE_SIZE, SYMMETRIC_KEY_SIZE};
use crate::error::CryptoError;

pub type SymmetricKey = [u8; SYMMETRIC_KEY_SIZE];

pub fn generate_symmetric_key() -> SymmetricKey {
    random_bytes()
}

pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    random_bytes()
}

pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
}

pub fn fill_random(buf: &mut [u8]) {
    rand::rngs::OsRng.fill_bytes(buf);
}

// Returns nonce || ciphertext (24 bytes nonce prepended)
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let nonce_bytes = generate_nonce();
    let ciphertext = seal_with_nonce(key, &nonce_bytes, plaintext)?;

    let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

pub fn decrypt(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < NONCE_SIZE {
        return Err(CryptoError::DecryptionFailed);
    }

    let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
    open_with_nonce(key, nonce_bytes, ciphertext)
}

// Returns ciphertext || tag
pub(crate) fn seal_with_nonce(
    key: &SymmetricKey,
    nonce: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    cipher
        .encrypt(XNonce::from_slice(nonce), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed)
}

pub(crate) fn open_with_nonce(
    key: &SymmetricKey,
    nonce: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

// BLAKE3 KDF with domain separation
pub(crate) fn derive_key(context: &str, parts: &[&[u8]]) -> SymmetricKey {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

pub(crate) fn derive_nonce(context: &str, parts: &[&[u8]]) -> [u8; NONCE_SIZE] {
    let hash = derive_key(context, parts);
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&hash[..NONCE_SIZE]);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sealed_blob_layout() {
        let key = generate_symmetric_key();
        let blob = br#"{"journalists":["generic_desk"]}"#;

        let sealed = encrypt(&key, blob).unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + blob.len() + 16);

        let (nonce, body) = sealed.split_at(NONCE_SIZE);
        assert_eq!(open_with_nonce(&key, nonce, body).unwrap(), blob);
    }

    #[test]
    fn test_resealing_uses_fresh_nonce() {
        let key = generate_symmetric_key();
        let blob = b"sending queue bytes";

        let first = encrypt(&key, blob).unwrap();
        let second = encrypt(&key, blob).unwrap();

        assert_ne!(first[..NONCE_SIZE], second[..NONCE_SIZE]);
        assert_ne!(first[NONCE_SIZE..], second[NONCE_SIZE..]);
        assert_eq!(decrypt(&key, &first).unwrap(), decrypt(&key, &second).unwrap());
    }

    #[test]
    fn test_sealed_blob_from_another_device_rejected() {
        let sealed = encrypt(&generate_symmetric_key(), b"user state").unwrap();
        assert!(matches!(
            decrypt(&generate_symmetric_key(), &sealed),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_damaged_blob_rejected() {
        let key = generate_symmetric_key();
        let sealed = encrypt(&key, b"user state").unwrap();

        let mut swapped_nonce = sealed.clone();
        swapped_nonce[..NONCE_SIZE].copy_from_slice(&generate_nonce());
        assert!(decrypt(&key, &swapped_nonce).is_err());

        // Shorter than a nonce, or a bare nonce without a tag
        assert!(decrypt(&key, &sealed[..NONCE_SIZE - 1]).is_err());
        assert!(decrypt(&key, &sealed[..NONCE_SIZE]).is_err());
    }

    #[test]
    fn test_derivation_contexts_separate() {
        let a = derive_key("context a", &[b"secret"]);
        let b = derive_key("context b", &[b"secret"]);
        assert_ne!(a, b);
        assert_eq!(a, derive_key("context a", &[b"secret"]));
    }
}
