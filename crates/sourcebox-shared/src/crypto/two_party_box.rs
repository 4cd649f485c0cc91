//! Authenticated box between two known parties.
//!
//! Layout: `ciphertext || MAC || nonce`. The key is derived from the X25519
//! agreement between the sender's secret key and the recipient's public key,
//! so only those two parties can produce or open it.

use std::marker::PhantomData;

use zeroize::Zeroizing;

use super::{derive_key, generate_nonce, open_with_nonce, seal_with_nonce};
use crate::constants::{KDF_CONTEXT_TWO_PARTY_BOX_KEY, NONCE_SIZE, TWO_PARTY_BOX_OVERHEAD};
use crate::encodable::Encodable;
use crate::error::CryptoError;
use crate::keys::{PublicEncryptionKey, Role, SecretEncryptionKey};

pub struct TwoPartyBox<T> {
    bytes: Vec<u8>,
    payload: PhantomData<fn() -> T>,
}

impl<T: Encodable> TwoPartyBox<T> {
    pub fn encrypt<Recipient: Role, Sender: Role>(
        recipient_pk: &PublicEncryptionKey<Recipient>,
        sender_sk: &SecretEncryptionKey<Sender>,
        data: &T,
    ) -> Result<Self, CryptoError> {
        let shared = sender_sk.diffie_hellman(recipient_pk);
        if !shared.was_contributory() {
            return Err(CryptoError::EncryptionFailed);
        }
        let key = Zeroizing::new(derive_key(KDF_CONTEXT_TWO_PARTY_BOX_KEY, &[shared.as_bytes()]));

        let nonce = generate_nonce();
        let plaintext = Zeroizing::new(data.as_unencrypted_bytes());
        let mut bytes = seal_with_nonce(&key, &nonce, &plaintext)?;
        bytes.extend_from_slice(&nonce);

        Ok(Self::from_vec_unchecked(bytes))
    }

    pub fn decrypt<Sender: Role, Recipient: Role>(
        sender_pk: &PublicEncryptionKey<Sender>,
        recipient_sk: &SecretEncryptionKey<Recipient>,
        two_party_box: &Self,
    ) -> Result<T, CryptoError> {
        let bytes = &two_party_box.bytes;
        if bytes.len() < TWO_PARTY_BOX_OVERHEAD {
            return Err(CryptoError::DecryptionFailed);
        }

        let (ciphertext, nonce) = bytes.split_at(bytes.len() - NONCE_SIZE);

        let shared = recipient_sk.diffie_hellman(sender_pk);
        if !shared.was_contributory() {
            return Err(CryptoError::DecryptionFailed);
        }
        let key = Zeroizing::new(derive_key(KDF_CONTEXT_TWO_PARTY_BOX_KEY, &[shared.as_bytes()]));

        let plaintext = Zeroizing::new(open_with_nonce(&key, nonce, ciphertext)?);
        Ok(T::from_unencrypted_bytes(&plaintext)?)
    }
}

impl<T> TwoPartyBox<T> {
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

impl<T> Clone for TwoPartyBox<T> {
    fn clone(&self) -> Self {
        Self::from_vec_unchecked(self.bytes.clone())
    }
}

impl<T> std::fmt::Debug for TwoPartyBox<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TwoPartyBox({} bytes)", self.bytes.len())
    }
}
