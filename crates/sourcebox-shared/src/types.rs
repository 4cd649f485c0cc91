use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::{MAX_JOURNALIST_IDENTITY_LEN, RECIPIENT_TAG_FOR_COVER, RECIPIENT_TAG_LEN};
use crate::error::EncodingError;

// Journalist or desk identifier as published by the key API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct JournalistIdentity(String);

impl JournalistIdentity {
    /// Validate an identifier. Must be non-empty, at most
    /// `MAX_JOURNALIST_IDENTITY_LEN` bytes and free of NUL bytes so it can be
    /// zero-terminated on the wire.
    pub fn new(id: impl Into<String>) -> Result<Self, EncodingError> {
        let id = id.into();
        if id.is_empty() || id.len() > MAX_JOURNALIST_IDENTITY_LEN || id.contains('\0') {
            return Err(EncodingError::InvalidJournalistIdentity);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn recipient_tag(&self) -> RecipientTag {
        RecipientTag::from_journalist_identity(self)
    }
}

impl TryFrom<String> for JournalistIdentity {
    type Error = EncodingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<JournalistIdentity> for String {
    fn from(id: JournalistIdentity) -> Self {
        id.0
    }
}

impl std::fmt::Display for JournalistIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoverNodeIdentity(pub String);

impl std::fmt::Display for CoverNodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Routing tag the CoverNode uses to forward a message to a journalist's
/// inbox. Derived from the first bytes of SHA-256 over the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecipientTag(pub [u8; RECIPIENT_TAG_LEN]);

impl RecipientTag {
    pub const COVER: Self = Self(RECIPIENT_TAG_FOR_COVER);

    pub fn from_journalist_identity(id: &JournalistIdentity) -> Self {
        let digest = Sha256::digest(id.as_str().as_bytes());
        let mut tag = [0u8; RECIPIENT_TAG_LEN];
        tag.copy_from_slice(&digest[..RECIPIENT_TAG_LEN]);
        Self(tag)
    }

    pub fn is_cover(&self) -> bool {
        *self == Self::COVER
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}
