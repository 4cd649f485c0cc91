//! Sealed box: anonymous single-recipient encryption.
//!
//! Layout: `ciphertext || MAC || ephemeral public key`. There is no nonce on
//! the wire; it is derived from the ephemeral and recipient public keys, which
//! is safe because the ephemeral key is never reused.

use std::marker::PhantomData;

use rand::rngs::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};
use zeroize::Zeroizing;

use super::{derive_key, derive_nonce, open_with_nonce, seal_with_nonce};
use crate::constants::{
    ANONYMOUS_BOX_OVERHEAD, KDF_CONTEXT_ANONYMOUS_BOX_KEY, KDF_CONTEXT_ANONYMOUS_BOX_NONCE,
    X25519_PUBLIC_KEY_LEN,
};
use crate::encodable::Encodable;
use crate::error::CryptoError;
use crate::keys::{PublicEncryptionKey, Role, SecretEncryptionKey};

pub struct AnonymousBox<T> {
    bytes: Vec<u8>,
    payload: PhantomData<fn() -> T>,
}

impl<T: Encodable> AnonymousBox<T> {
    pub fn encrypt<R: Role>(
        recipient_pk: &PublicEncryptionKey<R>,
        data: &T,
    ) -> Result<Self, CryptoError> {
        let ephemeral_sk = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_pk = X25519PublicKey::from(&ephemeral_sk);
        let shared = ephemeral_sk.diffie_hellman(&recipient_pk.as_x25519());
        if !shared.was_contributory() {
            return Err(CryptoError::EncryptionFailed);
        }

        let key = Zeroizing::new(derive_key(
            KDF_CONTEXT_ANONYMOUS_BOX_KEY,
            &[shared.as_bytes(), ephemeral_pk.as_bytes(), recipient_pk.as_bytes()],
        ));
        let nonce = derive_nonce(
            KDF_CONTEXT_ANONYMOUS_BOX_NONCE,
            &[ephemeral_pk.as_bytes(), recipient_pk.as_bytes()],
        );

        let plaintext = Zeroizing::new(data.as_unencrypted_bytes());
        let mut bytes = seal_with_nonce(&key, &nonce, &plaintext)?;
        bytes.extend_from_slice(ephemeral_pk.as_bytes());

        Ok(Self::from_vec_unchecked(bytes))
    }

    pub fn decrypt<R: Role>(
        recipient_pk: &PublicEncryptionKey<R>,
        recipient_sk: &SecretEncryptionKey<R>,
        anonymous_box: &Self,
    ) -> Result<T, CryptoError> {
        let bytes = &anonymous_box.bytes;
        if bytes.len() < ANONYMOUS_BOX_OVERHEAD {
            return Err(CryptoError::DecryptionFailed);
        }

        let (ciphertext, ephemeral_pk) = bytes.split_at(bytes.len() - X25519_PUBLIC_KEY_LEN);
        let ephemeral_pk = PublicEncryptionKey::<R>::from_slice(ephemeral_pk)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        let shared = recipient_sk.diffie_hellman(&ephemeral_pk);
        if !shared.was_contributory() {
            return Err(CryptoError::DecryptionFailed);
        }

        let key = Zeroizing::new(derive_key(
            KDF_CONTEXT_ANONYMOUS_BOX_KEY,
            &[shared.as_bytes(), ephemeral_pk.as_bytes(), recipient_pk.as_bytes()],
        ));
        let nonce = derive_nonce(
            KDF_CONTEXT_ANONYMOUS_BOX_NONCE,
            &[ephemeral_pk.as_bytes(), recipient_pk.as_bytes()],
        );

        let plaintext = Zeroizing::new(open_with_nonce(&key, &nonce, ciphertext)?);
        Ok(T::from_unencrypted_bytes(&plaintext)?)
    }
}

impl<T> AnonymousBox<T> {
    /// Wrap bytes received from elsewhere. Nothing is checked until decryption.
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

impl<T> Clone for AnonymousBox<T> {
    fn clone(&self) -> Self {
        Self::from_vec_unchecked(self.bytes.clone())
    }
}

impl<T> PartialEq for AnonymousBox<T> {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl<T> Eq for AnonymousBox<T> {}

impl<T> std::fmt::Debug for AnonymousBox<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AnonymousBox({} bytes)", self.bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::keys::{EncryptionKeyPair, JournalistMessaging};

    #[test]
    fn test_roundtrip() {
        let recipient = EncryptionKeyPair::<JournalistMessaging>::generate();
        let data = b"Hello, anonymous box!".to_vec();

        let sealed = AnonymousBox::encrypt(recipient.public_key(), &data).unwrap();
        assert_eq!(sealed.len(), data.len() + ANONYMOUS_BOX_OVERHEAD);

        let opened =
            AnonymousBox::decrypt(recipient.public_key(), recipient.secret_key(), &sealed).unwrap();
        assert_eq!(opened, data);
    }

    #[test]
    fn test_wrong_key_fails() {
        let recipient = EncryptionKeyPair::<JournalistMessaging>::generate();
        let other = EncryptionKeyPair::<JournalistMessaging>::generate();

        let sealed = AnonymousBox::encrypt(recipient.public_key(), &b"secret".to_vec()).unwrap();
        let result = AnonymousBox::decrypt(other.public_key(), other.secret_key(), &sealed);
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn test_truncated_box_fails() {
        let recipient = EncryptionKeyPair::<JournalistMessaging>::generate();
        let short = AnonymousBox::<Vec<u8>>::from_vec_unchecked(vec![0u8; ANONYMOUS_BOX_OVERHEAD - 1]);
        assert!(AnonymousBox::decrypt(recipient.public_key(), recipient.secret_key(), &short).is_err());
    }

    #[test]
    fn test_payload_decoder_errors_surface() {
        let recipient = EncryptionKeyPair::<JournalistMessaging>::generate();
        let sealed = AnonymousBox::encrypt(recipient.public_key(), &vec![0xFFu8, 0xFE]).unwrap();
        let reinterpreted = AnonymousBox::<String>::from_vec_unchecked(sealed.into_bytes());

        let result =
            AnonymousBox::decrypt(recipient.public_key(), recipient.secret_key(), &reinterpreted);
        assert!(matches!(result, Err(CryptoError::Payload(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_any_bit_flip_fails(data in proptest::collection::vec(any::<u8>(), 0..64), bit in any::<usize>()) {
            let recipient = EncryptionKeyPair::<JournalistMessaging>::generate();
            let sealed = AnonymousBox::encrypt(recipient.public_key(), &data).unwrap();

            let mut bytes = sealed.into_bytes();
            let bit = bit % (bytes.len() * 8);
            bytes[bit / 8] ^= 1 << (bit % 8);

            let tampered = AnonymousBox::<Vec<u8>>::from_vec_unchecked(bytes);
            prop_assert!(AnonymousBox::decrypt(recipient.public_key(), recipient.secret_key(), &tampered).is_err());
        }
    }
}
