//! Certified keys.
//!
//! A certificate is an Ed25519 signature by the parent key over
//! `key bytes || big-endian u64 not_valid_after (unix seconds)`. The types in
//! this module can only be obtained by verifying such a certificate (or by
//! issuing one with the parent's signing key), so holding one is proof that
//! the chain above it checked out at verification time.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

use super::encryption::PublicEncryptionKey;
use super::roles::{ChildRole, Organization, Role, TrustedOrganization};
use super::signing::{PublicSigningKey, Signature, SigningKeyPair};
use crate::api::UntrustedKeyData;
use crate::error::KeyError;

/// Build the exact byte string a certificate signs.
pub fn certificate_data(key_bytes: &[u8; 32], not_valid_after: DateTime<Utc>) -> Vec<u8> {
    let expiry = not_valid_after.timestamp().max(0) as u64;
    let mut data = Vec::with_capacity(key_bytes.len() + 8);
    data.extend_from_slice(key_bytes);
    data.extend_from_slice(&expiry.to_be_bytes());
    data
}

fn check_not_expired(not_valid_after: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), KeyError> {
    if now > not_valid_after {
        return Err(KeyError::Expired(not_valid_after));
    }
    Ok(())
}

// Only whole seconds are signed
fn parse_not_valid_after(value: &str) -> Result<DateTime<Utc>, KeyError> {
    Ok(DateTime::parse_from_rfc3339(value)?
        .with_timezone(&Utc)
        .trunc_subsecs(0))
}

// The certificate sits in the wire format next to a key whose signature we
// have not yet checked; this is the parsed-but-unverified form of it.
struct ParsedCertificate<P: Role> {
    key_bytes: Vec<u8>,
    signature: Signature<P>,
    not_valid_after: DateTime<Utc>,
}

impl<P: Role> ParsedCertificate<P> {
    fn parse(untrusted: &UntrustedKeyData) -> Result<Self, KeyError> {
        Ok(Self {
            key_bytes: hex::decode(untrusted.key.trim())?,
            signature: Signature::from_hex(&untrusted.certificate)?,
            not_valid_after: parse_not_valid_after(&untrusted.not_valid_after)?,
        })
    }

    fn check(
        &self,
        key_bytes: &[u8; 32],
        parent: &PublicSigningKey<P>,
        now: DateTime<Utc>,
    ) -> Result<(), KeyError> {
        parent.verify(&certificate_data(key_bytes, self.not_valid_after), &self.signature)?;
        check_not_expired(self.not_valid_after, now)
    }
}

/// A signing key that has passed verification, usable as the parent of the
/// next level in the hierarchy.
pub trait VerifiedSigningKey<R: Role> {
    fn public_key(&self) -> &PublicSigningKey<R>;

    fn not_valid_after(&self) -> DateTime<Utc>;
}

/// Root of trust: an organization key that signs itself and appears in the
/// bundled trusted root list.
#[derive(Debug, Clone)]
pub struct SelfSignedPublicSigningKey<R: Role> {
    key: PublicSigningKey<R>,
    certificate: Signature<R>,
    not_valid_after: DateTime<Utc>,
}

impl SelfSignedPublicSigningKey<Organization> {
    pub fn verify(
        untrusted: &UntrustedKeyData,
        trusted_roots: &[PublicSigningKey<TrustedOrganization>],
        now: DateTime<Utc>,
    ) -> Result<Self, KeyError> {
        let parsed = ParsedCertificate::<Organization>::parse(untrusted)?;
        let key = PublicSigningKey::<Organization>::from_slice(&parsed.key_bytes)?;

        if !trusted_roots
            .iter()
            .any(|root| root.as_bytes() == key.as_bytes())
        {
            return Err(KeyError::UntrustedRoot);
        }

        parsed.check(key.as_bytes(), &key, now)?;

        Ok(Self {
            key,
            certificate: parsed.signature,
            not_valid_after: parsed.not_valid_after,
        })
    }

    /// The same key re-tagged as a trust anchor, for bundling with the app.
    pub fn as_trusted_root(&self) -> PublicSigningKey<TrustedOrganization> {
        self.key.cast()
    }
}

impl<R: Role> SelfSignedPublicSigningKey<R> {
    pub fn certificate(&self) -> &Signature<R> {
        &self.certificate
    }

    pub fn to_untrusted(&self) -> UntrustedKeyData {
        UntrustedKeyData::new(self.key.as_bytes(), &self.certificate.to_bytes(), self.not_valid_after)
    }
}

impl<R: Role> VerifiedSigningKey<R> for SelfSignedPublicSigningKey<R> {
    fn public_key(&self) -> &PublicSigningKey<R> {
        &self.key
    }

    fn not_valid_after(&self) -> DateTime<Utc> {
        self.not_valid_after
    }
}

#[derive(Debug, Clone)]
pub struct SignedPublicSigningKey<R: ChildRole> {
    key: PublicSigningKey<R>,
    certificate: Signature<R::Parent>,
    not_valid_after: DateTime<Utc>,
}

impl<R: ChildRole> SignedPublicSigningKey<R> {
    pub fn verify(
        untrusted: &UntrustedKeyData,
        parent: &impl VerifiedSigningKey<R::Parent>,
        now: DateTime<Utc>,
    ) -> Result<Self, KeyError> {
        let parsed = ParsedCertificate::<R::Parent>::parse(untrusted)?;
        let key = PublicSigningKey::<R>::from_slice(&parsed.key_bytes)?;
        parsed.check(key.as_bytes(), parent.public_key(), now)?;

        Ok(Self {
            key,
            certificate: parsed.signature,
            not_valid_after: parsed.not_valid_after,
        })
    }

    pub fn certificate(&self) -> &Signature<R::Parent> {
        &self.certificate
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.not_valid_after
    }

    pub fn to_untrusted(&self) -> UntrustedKeyData {
        UntrustedKeyData::new(self.key.as_bytes(), &self.certificate.to_bytes(), self.not_valid_after)
    }
}

impl<R: ChildRole> VerifiedSigningKey<R> for SignedPublicSigningKey<R> {
    fn public_key(&self) -> &PublicSigningKey<R> {
        &self.key
    }

    fn not_valid_after(&self) -> DateTime<Utc> {
        self.not_valid_after
    }
}

#[derive(Debug, Clone)]
pub struct SignedPublicEncryptionKey<R: ChildRole> {
    key: PublicEncryptionKey<R>,
    certificate: Signature<R::Parent>,
    not_valid_after: DateTime<Utc>,
}

impl<R: ChildRole> SignedPublicEncryptionKey<R> {
    pub fn verify(
        untrusted: &UntrustedKeyData,
        parent: &impl VerifiedSigningKey<R::Parent>,
        now: DateTime<Utc>,
    ) -> Result<Self, KeyError> {
        let parsed = ParsedCertificate::<R::Parent>::parse(untrusted)?;
        let key = PublicEncryptionKey::<R>::from_slice(&parsed.key_bytes)?;
        parsed.check(key.as_bytes(), parent.public_key(), now)?;

        Ok(Self {
            key,
            certificate: parsed.signature,
            not_valid_after: parsed.not_valid_after,
        })
    }

    pub fn public_key(&self) -> &PublicEncryptionKey<R> {
        &self.key
    }

    pub fn not_valid_after(&self) -> DateTime<Utc> {
        self.not_valid_after
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now <= self.not_valid_after
    }

    pub fn to_untrusted(&self) -> UntrustedKeyData {
        UntrustedKeyData::new(self.key.as_bytes(), &self.certificate.to_bytes(), self.not_valid_after)
    }
}

// Issuing side, used by organisation tooling and test fixtures.

impl SigningKeyPair<Organization> {
    pub fn self_sign(&self, not_valid_after: DateTime<Utc>) -> SelfSignedPublicSigningKey<Organization> {
        let key = self.public_key();
        let certificate = self.sign(&certificate_data(key.as_bytes(), not_valid_after));
        SelfSignedPublicSigningKey {
            key,
            certificate,
            not_valid_after,
        }
    }
}

impl<P: Role> SigningKeyPair<P> {
    pub fn sign_public_key<R: ChildRole<Parent = P>>(
        &self,
        key: PublicSigningKey<R>,
        not_valid_after: DateTime<Utc>,
    ) -> SignedPublicSigningKey<R> {
        let certificate = self.sign(&certificate_data(key.as_bytes(), not_valid_after));
        SignedPublicSigningKey {
            key,
            certificate,
            not_valid_after,
        }
    }

    pub fn sign_encryption_key<R: ChildRole<Parent = P>>(
        &self,
        key: PublicEncryptionKey<R>,
        not_valid_after: DateTime<Utc>,
    ) -> SignedPublicEncryptionKey<R> {
        let certificate = self.sign(&certificate_data(key.as_bytes(), not_valid_after));
        SignedPublicEncryptionKey {
            key,
            certificate,
            not_valid_after,
        }
    }
}

impl UntrustedKeyData {
    fn new(key: &[u8; 32], certificate: &[u8], not_valid_after: DateTime<Utc>) -> Self {
        Self {
            key: hex::encode(key),
            certificate: hex::encode(certificate),
            not_valid_after: not_valid_after.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}
