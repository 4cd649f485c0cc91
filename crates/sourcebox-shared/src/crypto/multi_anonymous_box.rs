//! Hybrid multi-recipient box.
//!
//! A fresh symmetric key encrypts the payload once; that key is then sealed
//! to each recipient with an [`AnonymousBox`]. Layout:
//!
//! ```text
//! wrapped_key_1 || ... || wrapped_key_n || ciphertext || MAC
//! ```
//!
//! The payload is encrypted under an all-zero nonce. That is only sound
//! because the key is generated for this one box and never reused.
//!
//! Recipients are not identified on the wire: a recipient finds its slot by
//! trying each in turn.

use std::marker::PhantomData;

use zeroize::{Zeroize, Zeroizing};

use super::anonymous_box::AnonymousBox;
use super::{generate_symmetric_key, open_with_nonce, seal_with_nonce, SymmetricKey};
use crate::constants::{MAC_SIZE, MULTI_ANONYMOUS_BOX_WRAPPED_KEY_LEN, NONCE_SIZE, SYMMETRIC_KEY_SIZE};
use crate::encodable::{fixed_bytes, Encodable};
use crate::error::{CryptoError, EncodingError};
use crate::keys::{PublicEncryptionKey, Role, SecretEncryptionKey};

const ZERO_NONCE: [u8; NONCE_SIZE] = [0u8; NONCE_SIZE];

/// Single-use key for the payload of a [`MultiAnonymousBox`].
pub struct SecretBoxKey(SymmetricKey);

impl Drop for SecretBoxKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl Encodable for SecretBoxKey {
    fn as_unencrypted_bytes(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    fn from_unencrypted_bytes(bytes: &[u8]) -> Result<Self, EncodingError> {
        Ok(Self(fixed_bytes::<SYMMETRIC_KEY_SIZE>(bytes)?))
    }
}

pub struct MultiAnonymousBox<T> {
    bytes: Vec<u8>,
    payload: PhantomData<fn() -> T>,
}

impl<T: Encodable> MultiAnonymousBox<T> {
    pub fn encrypt<R: Role>(
        recipient_pks: &[PublicEncryptionKey<R>],
        data: &T,
    ) -> Result<Self, CryptoError> {
        if recipient_pks.is_empty() {
            return Err(CryptoError::MissingRecipientPublicKeys);
        }

        let key = SecretBoxKey(generate_symmetric_key());
        let plaintext = Zeroizing::new(data.as_unencrypted_bytes());

        let mut bytes = Vec::with_capacity(
            recipient_pks.len() * MULTI_ANONYMOUS_BOX_WRAPPED_KEY_LEN + plaintext.len() + MAC_SIZE,
        );
        for recipient_pk in recipient_pks {
            let wrapped = AnonymousBox::encrypt(recipient_pk, &key)?;
            bytes.extend_from_slice(wrapped.as_bytes());
        }

        let ciphertext = seal_with_nonce(&key.0, &ZERO_NONCE, &plaintext)?;
        bytes.extend_from_slice(&ciphertext);

        Ok(Self::from_vec_unchecked(bytes))
    }

    /// Scan the `num_recipients` wrapped-key slots in order and open the
    /// payload with the first key that unwraps.
    pub fn decrypt<R: Role>(
        recipient_pk: &PublicEncryptionKey<R>,
        recipient_sk: &SecretEncryptionKey<R>,
        multi_box: &Self,
        num_recipients: usize,
    ) -> Result<T, CryptoError> {
        let header_len = num_recipients
            .checked_mul(MULTI_ANONYMOUS_BOX_WRAPPED_KEY_LEN)
            .ok_or(CryptoError::DecryptWithSecretBoxFailed)?;
        if num_recipients == 0 || multi_box.bytes.len() < header_len + MAC_SIZE {
            return Err(CryptoError::DecryptWithSecretBoxFailed);
        }

        let (wrapped_keys, ciphertext) = multi_box.bytes.split_at(header_len);

        let key = wrapped_keys
            .chunks_exact(MULTI_ANONYMOUS_BOX_WRAPPED_KEY_LEN)
            .find_map(|slot| {
                let wrapped = AnonymousBox::<SecretBoxKey>::from_vec_unchecked(slot.to_vec());
                AnonymousBox::decrypt(recipient_pk, recipient_sk, &wrapped).ok()
            })
            .ok_or(CryptoError::DecryptWithSecretBoxFailed)?;

        let plaintext = Zeroizing::new(
            open_with_nonce(&key.0, &ZERO_NONCE, ciphertext)
                .map_err(|_| CryptoError::DecryptWithSecretBoxFailed)?,
        );
        Ok(T::from_unencrypted_bytes(&plaintext)?)
    }
}

impl<T> MultiAnonymousBox<T> {
    pub fn from_vec_unchecked(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            payload: PhantomData,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl<T> Clone for MultiAnonymousBox<T> {
    fn clone(&self) -> Self {
        Self::from_vec_unchecked(self.bytes.clone())
    }
}

impl<T> PartialEq for MultiAnonymousBox<T> {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl<T> Eq for MultiAnonymousBox<T> {}

impl<T> std::fmt::Debug for MultiAnonymousBox<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MultiAnonymousBox({} bytes)", self.bytes.len())
    }
}
