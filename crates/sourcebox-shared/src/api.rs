//! JSON documents served by the public API.
//!
//! Everything here is untrusted. Keys become usable only after passing
//! through [`VerifiedPublicKeys`](crate::hierarchy::VerifiedPublicKeys) and
//! dead drops through [`VerifiedDeadDrops`](crate::dead_drop::VerifiedDeadDrops).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::JournalistIdentity;

/// A public key with its certificate, as published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntrustedKeyData {
    /// Hex-encoded key bytes
    pub key: String,
    /// Hex-encoded Ed25519 signature by the parent key
    pub certificate: String,
    /// RFC 3339 timestamp
    pub not_valid_after: String,
}

/// An identity key and the messaging keys it certified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntrustedIdentityFamily {
    pub id_pk: UntrustedKeyData,
    pub msg_pks: Vec<UntrustedKeyData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntrustedCoverNodeProvisioningFamily {
    pub provisioning_pk: UntrustedKeyData,
    pub covernodes: BTreeMap<String, Vec<UntrustedIdentityFamily>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntrustedJournalistProvisioningFamily {
    pub provisioning_pk: UntrustedKeyData,
    pub journalists: BTreeMap<String, Vec<UntrustedIdentityFamily>>,
}

/// One root generation of the key hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntrustedOrganizationFamily {
    pub org_pk: UntrustedKeyData,
    #[serde(default)]
    pub covernodes: Vec<UntrustedCoverNodeProvisioningFamily>,
    #[serde(default)]
    pub journalists: Vec<UntrustedJournalistProvisioningFamily>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalistStatus {
    #[default]
    Visible,
    HiddenFromUi,
    HiddenFromResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalistProfile {
    pub id: JournalistIdentity,
    pub display_name: String,
    #[serde(default)]
    pub sort_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_desk: bool,
    #[serde(default)]
    pub status: JournalistStatus,
}

impl JournalistProfile {
    pub fn is_visible(&self) -> bool {
        self.status == JournalistStatus::Visible
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeysData {
    #[serde(default)]
    pub journalist_profiles: Vec<JournalistProfile>,
    #[serde(default)]
    pub default_journalist_id: Option<JournalistIdentity>,
    pub keys: Vec<UntrustedOrganizationFamily>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntrustedDeadDrop {
    pub id: u32,
    /// RFC 3339 timestamp
    pub created_at: String,
    /// Base64 concatenation of journalist to user ciphertexts
    pub data: String,
    /// Hex Ed25519 signature over the raw data
    pub cert: String,
    /// Hex Ed25519 signature over SHA-256(data || created_at)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadDropData {
    pub dead_drops: Vec<UntrustedDeadDrop>,
}
