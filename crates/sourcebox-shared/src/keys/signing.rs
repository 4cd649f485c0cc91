use std::marker::PhantomData;

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;

use super::roles::Role;
use crate::constants::{ED25519_PUBLIC_KEY_LEN, SIGNATURE_LEN};
use crate::error::KeyError;

/// Ed25519 verifying key tagged with its role.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicSigningKey<R: Role> {
    key: VerifyingKey,
    role: PhantomData<R>,
}

impl<R: Role> PublicSigningKey<R> {
    pub fn from_bytes(bytes: &[u8; ED25519_PUBLIC_KEY_LEN]) -> Result<Self, KeyError> {
        let key = VerifyingKey::from_bytes(bytes).map_err(|_| KeyError::InvalidKeyBytes)?;
        Ok(Self {
            key,
            role: PhantomData,
        })
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; ED25519_PUBLIC_KEY_LEN] =
            bytes.try_into().map_err(|_| KeyError::InvalidKeyBytes)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        Self::from_slice(&hex::decode(s.trim())?)
    }

    pub fn as_bytes(&self) -> &[u8; ED25519_PUBLIC_KEY_LEN] {
        self.key.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// Re-tag the same key bytes with another role. Only used where a key
    /// is compared against an out-of-band list (trusted roots).
    pub(crate) fn cast<T: Role>(&self) -> PublicSigningKey<T> {
        PublicSigningKey {
            key: self.key,
            role: PhantomData,
        }
    }

    /// Strict Ed25519 verification (rejects small-order and malleable inputs).
    pub fn verify(&self, message: &[u8], signature: &Signature<R>) -> Result<(), KeyError> {
        let signature = ed25519_dalek::Signature::from_bytes(&signature.bytes);
        self.key
            .verify_strict(message, &signature)
            .map_err(|_| KeyError::SignatureVerificationFailed)
    }
}

impl<R: Role> std::fmt::Debug for PublicSigningKey<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicSigningKey<{}>({})", R::DISPLAY_NAME, self.to_hex())
    }
}

/// Signature produced by a key of role `R`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature<R: Role> {
    bytes: [u8; SIGNATURE_LEN],
    role: PhantomData<R>,
}

impl<R: Role> Signature<R> {
    pub fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self {
            bytes,
            role: PhantomData,
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let bytes: [u8; SIGNATURE_LEN] =
            bytes.try_into().map_err(|_| KeyError::InvalidSignatureBytes)?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        Self::from_slice(&hex::decode(s.trim())?)
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl<R: Role> std::fmt::Debug for Signature<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature<{}>({})", R::DISPLAY_NAME, self.to_hex())
    }
}

#[derive(Clone)]
pub struct SigningKeyPair<R: Role> {
    signing_key: SigningKey,
    role: PhantomData<R>,
}

impl<R: Role> SigningKeyPair<R> {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
            role: PhantomData,
        }
    }

    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(secret),
            role: PhantomData,
        }
    }

    pub fn public_key(&self) -> PublicSigningKey<R> {
        PublicSigningKey {
            key: self.signing_key.verifying_key(),
            role: PhantomData,
        }
    }

    pub fn sign(&self, message: &[u8]) -> Signature<R> {
        Signature::from_bytes(self.signing_key.sign(message).to_bytes())
    }
}

impl<R: Role> std::fmt::Debug for SigningKeyPair<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}
