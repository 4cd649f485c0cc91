use std::marker::PhantomData;

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, SharedSecret, StaticSecret};

use super::roles::Role;
use crate::constants::X25519_PUBLIC_KEY_LEN;
use crate::error::KeyError;

/// X25519 public key tagged with its role.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct PublicEncryptionKey<R: Role> {
    bytes: [u8; X25519_PUBLIC_KEY_LEN],
    #[serde(skip)]
    role: PhantomData<R>,
}

impl<R: Role> PublicEncryptionKey<R> {
    pub fn from_bytes(bytes: [u8; X25519_PUBLIC_KEY_LEN]) -> Self {
        Self {
            bytes,
            role: PhantomData,
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; X25519_PUBLIC_KEY_LEN] =
            bytes.try_into().map_err(|_| KeyError::InvalidKeyBytes)?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        Self::from_slice(&hex::decode(s.trim())?)
    }

    pub fn as_bytes(&self) -> &[u8; X25519_PUBLIC_KEY_LEN] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub(crate) fn as_x25519(&self) -> X25519PublicKey {
        X25519PublicKey::from(self.bytes)
    }
}

impl<R: Role> std::fmt::Debug for PublicEncryptionKey<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicEncryptionKey<{}>({})", R::DISPLAY_NAME, self.to_hex())
    }
}

/// X25519 secret key tagged with its role. Zeroized on drop.
#[derive(Clone, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct SecretEncryptionKey<R: Role> {
    secret: StaticSecret,
    #[serde(skip)]
    role: PhantomData<R>,
}

impl<R: Role> SecretEncryptionKey<R> {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            secret: StaticSecret::from(bytes),
            role: PhantomData,
        }
    }

    pub fn public_key(&self) -> PublicEncryptionKey<R> {
        PublicEncryptionKey::from_bytes(X25519PublicKey::from(&self.secret).to_bytes())
    }

    pub(crate) fn diffie_hellman<P: Role>(&self, their_public: &PublicEncryptionKey<P>) -> SharedSecret {
        self.secret.diffie_hellman(&their_public.as_x25519())
    }
}

impl<R: Role> std::fmt::Debug for SecretEncryptionKey<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretEncryptionKey<{}>(..)", R::DISPLAY_NAME)
    }
}

// Persisted as the secret key alone; the public half is re-derived on load.
#[derive(Clone, Serialize, Deserialize)]
#[serde(
    bound = "",
    from = "SecretEncryptionKey<R>",
    into = "SecretEncryptionKey<R>"
)]
pub struct EncryptionKeyPair<R: Role> {
    public_key: PublicEncryptionKey<R>,
    secret_key: SecretEncryptionKey<R>,
}

impl<R: Role> EncryptionKeyPair<R> {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        Self::from_secret_key(SecretEncryptionKey {
            secret,
            role: PhantomData,
        })
    }

    pub fn from_secret_key(secret_key: SecretEncryptionKey<R>) -> Self {
        Self {
            public_key: secret_key.public_key(),
            secret_key,
        }
    }

    pub fn public_key(&self) -> &PublicEncryptionKey<R> {
        &self.public_key
    }

    pub fn secret_key(&self) -> &SecretEncryptionKey<R> {
        &self.secret_key
    }
}

impl<R: Role> From<SecretEncryptionKey<R>> for EncryptionKeyPair<R> {
    fn from(secret_key: SecretEncryptionKey<R>) -> Self {
        Self::from_secret_key(secret_key)
    }
}

impl<R: Role> From<EncryptionKeyPair<R>> for SecretEncryptionKey<R> {
    fn from(pair: EncryptionKeyPair<R>) -> Self {
        pair.secret_key
    }
}

impl<R: Role> std::fmt::Debug for EncryptionKeyPair<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}
