//! Fixtures: a complete, freshly issued key hierarchy.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, SubsecRound, Utc};

use crate::api::{
    JournalistProfile, JournalistStatus, PublicKeysData, UntrustedCoverNodeProvisioningFamily,
    UntrustedIdentityFamily, UntrustedJournalistProvisioningFamily, UntrustedOrganizationFamily,
};
use crate::hierarchy::VerifiedPublicKeys;
use crate::keys::{
    CoverNodeId, CoverNodeMessaging, CoverNodeProvisioning, EncryptionKeyPair, JournalistId,
    JournalistMessaging, JournalistProvisioning, Organization, PublicSigningKey, SigningKeyPair,
    TrustedOrganization,
};
use crate::types::{CoverNodeIdentity, JournalistIdentity};

pub const ORGANIZATION_KEY_VALIDITY_DAYS: i64 = 365;
pub const PROVISIONING_KEY_VALIDITY_DAYS: i64 = 180;
pub const ID_KEY_VALIDITY_DAYS: i64 = 90;
pub const MESSAGING_KEY_VALIDITY_DAYS: i64 = 14;

pub struct TestCoverNode {
    pub identity: CoverNodeIdentity,
    pub id_key: SigningKeyPair<CoverNodeId>,
    pub messaging: EncryptionKeyPair<CoverNodeMessaging>,
}

pub struct TestJournalist {
    pub identity: JournalistIdentity,
    pub display_name: String,
    pub id_key: SigningKeyPair<JournalistId>,
    pub messaging: EncryptionKeyPair<JournalistMessaging>,
}

/// One organization with two CoverNodes and two journalists, every key
/// issued at `now` with the validity periods above.
pub struct TestKeyHierarchy {
    pub now: DateTime<Utc>,
    pub org: SigningKeyPair<Organization>,
    pub covernode_provisioning: SigningKeyPair<CoverNodeProvisioning>,
    pub journalist_provisioning: SigningKeyPair<JournalistProvisioning>,
    pub covernodes: Vec<TestCoverNode>,
    pub journalists: Vec<TestJournalist>,
}

impl TestKeyHierarchy {
    pub fn new(now: DateTime<Utc>) -> Self {
        // Certificates carry whole seconds
        let now = now.trunc_subsecs(0);

        let covernodes = ["covernode_001", "covernode_002"]
            .into_iter()
            .map(|name| TestCoverNode {
                identity: CoverNodeIdentity(name.to_string()),
                id_key: SigningKeyPair::generate(),
                messaging: EncryptionKeyPair::generate(),
            })
            .collect();

        let journalists = [("static_test_journalist", "Static Test Journalist"), ("generic_desk", "Generic Desk")]
            .into_iter()
            .map(|(id, display_name)| TestJournalist {
                identity: JournalistIdentity::new(id).expect("fixture identity is valid"),
                display_name: display_name.to_string(),
                id_key: SigningKeyPair::generate(),
                messaging: EncryptionKeyPair::generate(),
            })
            .collect();

        Self {
            now,
            org: SigningKeyPair::generate(),
            covernode_provisioning: SigningKeyPair::generate(),
            journalist_provisioning: SigningKeyPair::generate(),
            covernodes,
            journalists,
        }
    }

    pub fn trusted_roots(&self) -> Vec<PublicSigningKey<TrustedOrganization>> {
        vec![self
            .org
            .self_sign(self.expiry(ORGANIZATION_KEY_VALIDITY_DAYS))
            .as_trusted_root()]
    }

    pub fn journalist_profile(&self, journalist: &TestJournalist) -> JournalistProfile {
        JournalistProfile {
            id: journalist.identity.clone(),
            display_name: journalist.display_name.clone(),
            sort_name: journalist.display_name.to_lowercase(),
            description: String::new(),
            is_desk: journalist.identity.as_str().ends_with("_desk"),
            status: JournalistStatus::Visible,
        }
    }

    pub fn public_keys_data(&self) -> PublicKeysData {
        let provisioning_expiry = self.expiry(PROVISIONING_KEY_VALIDITY_DAYS);
        let id_expiry = self.expiry(ID_KEY_VALIDITY_DAYS);
        let messaging_expiry = self.expiry(MESSAGING_KEY_VALIDITY_DAYS);

        let covernodes: BTreeMap<_, _> = self
            .covernodes
            .iter()
            .map(|covernode| {
                let family = UntrustedIdentityFamily {
                    id_pk: self
                        .covernode_provisioning
                        .sign_public_key(covernode.id_key.public_key(), id_expiry)
                        .to_untrusted(),
                    msg_pks: vec![covernode
                        .id_key
                        .sign_encryption_key(*covernode.messaging.public_key(), messaging_expiry)
                        .to_untrusted()],
                };
                (covernode.identity.0.clone(), vec![family])
            })
            .collect();

        let journalists: BTreeMap<_, _> = self
            .journalists
            .iter()
            .map(|journalist| {
                let family = UntrustedIdentityFamily {
                    id_pk: self
                        .journalist_provisioning
                        .sign_public_key(journalist.id_key.public_key(), id_expiry)
                        .to_untrusted(),
                    msg_pks: vec![journalist
                        .id_key
                        .sign_encryption_key(*journalist.messaging.public_key(), messaging_expiry)
                        .to_untrusted()],
                };
                (journalist.identity.as_str().to_string(), vec![family])
            })
            .collect();

        PublicKeysData {
            journalist_profiles: self.journalists.iter().map(|j| self.journalist_profile(j)).collect(),
            default_journalist_id: self.journalists.first().map(|j| j.identity.clone()),
            keys: vec![UntrustedOrganizationFamily {
                org_pk: self
                    .org
                    .self_sign(self.expiry(ORGANIZATION_KEY_VALIDITY_DAYS))
                    .to_untrusted(),
                covernodes: vec![UntrustedCoverNodeProvisioningFamily {
                    provisioning_pk: self
                        .org
                        .sign_public_key(self.covernode_provisioning.public_key(), provisioning_expiry)
                        .to_untrusted(),
                    covernodes,
                }],
                journalists: vec![UntrustedJournalistProvisioningFamily {
                    provisioning_pk: self
                        .org
                        .sign_public_key(self.journalist_provisioning.public_key(), provisioning_expiry)
                        .to_untrusted(),
                    journalists,
                }],
            }],
        }
    }

    pub fn verified_public_keys(&self) -> VerifiedPublicKeys {
        VerifiedPublicKeys::from_public_keys_data(&self.public_keys_data(), &self.trusted_roots(), self.now)
            .expect("fixture hierarchy verifies")
    }

    fn expiry(&self, days: i64) -> DateTime<Utc> {
        self.now + Duration::days(days)
    }
}
