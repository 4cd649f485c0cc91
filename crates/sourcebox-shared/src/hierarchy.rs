//! Verified view of the published key hierarchy.
//!
//! The public keys document is verified top-down: organization root,
//! provisioning keys, identity keys, messaging keys, separately for the
//! CoverNode and journalist branches. A key that fails verification is
//! dropped together with everything beneath it; the rest of the document is
//! still used.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::api::{JournalistProfile, PublicKeysData, UntrustedIdentityFamily, UntrustedKeyData, UntrustedOrganizationFamily};
use crate::error::KeyError;
use crate::keys::{
    ChildRole, CoverNodeId, CoverNodeMessaging, CoverNodeProvisioning, JournalistId,
    JournalistMessaging, JournalistProvisioning, Organization, PublicEncryptionKey,
    PublicSigningKey, Role, SelfSignedPublicSigningKey, SignedPublicEncryptionKey,
    SignedPublicSigningKey, TrustedOrganization, VerifiedSigningKey,
};
use crate::types::{CoverNodeIdentity, JournalistIdentity};

/// An identity key and its verified messaging keys, oldest first.
#[derive(Debug, Clone)]
pub struct VerifiedIdentityHierarchy<I: ChildRole, M: ChildRole<Parent = I>> {
    id_pk: SignedPublicSigningKey<I>,
    msg_pks: Vec<SignedPublicEncryptionKey<M>>,
}

impl<I: ChildRole, M: ChildRole<Parent = I>> VerifiedIdentityHierarchy<I, M> {
    fn verify(
        untrusted: &UntrustedIdentityFamily,
        provisioning_pk: &SignedPublicSigningKey<I::Parent>,
        now: DateTime<Utc>,
    ) -> Option<Self>
    where
        I::Parent: ChildRole,
    {
        let id_pk = match SignedPublicSigningKey::<I>::verify(&untrusted.id_pk, provisioning_pk, now) {
            Ok(id_pk) => id_pk,
            Err(error) => {
                debug!(role = I::DISPLAY_NAME, %error, "Dropping identity key");
                return None;
            }
        };

        let mut msg_pks: Vec<_> = untrusted
            .msg_pks
            .iter()
            .filter_map(|msg_pk| match SignedPublicEncryptionKey::<M>::verify(msg_pk, &id_pk, now) {
                Ok(msg_pk) => Some(msg_pk),
                Err(error) => {
                    debug!(role = M::DISPLAY_NAME, %error, "Dropping messaging key");
                    None
                }
            })
            .collect();

        if msg_pks.is_empty() {
            debug!(role = I::DISPLAY_NAME, "Dropping identity key without valid messaging keys");
            return None;
        }
        msg_pks.sort_by_key(|msg_pk| msg_pk.not_valid_after());

        Some(Self { id_pk, msg_pks })
    }

    pub fn id_pk(&self) -> &SignedPublicSigningKey<I> {
        &self.id_pk
    }

    pub fn msg_pks(&self) -> &[SignedPublicEncryptionKey<M>] {
        &self.msg_pks
    }

    fn valid_msg_pks(&self, now: DateTime<Utc>) -> impl Iterator<Item = &SignedPublicEncryptionKey<M>> {
        let id_valid = self.id_pk.is_valid_at(now);
        self.msg_pks
            .iter()
            .filter(move |msg_pk| id_valid && msg_pk.is_valid_at(now))
    }
}

/// A provisioning key and the identities it certified, keyed by member name.
#[derive(Debug, Clone)]
pub struct VerifiedProvisioningHierarchy<P, I, M, K>
where
    P: ChildRole<Parent = Organization>,
    I: ChildRole<Parent = P>,
    M: ChildRole<Parent = I>,
{
    provisioning_pk: SignedPublicSigningKey<P>,
    members: BTreeMap<K, Vec<VerifiedIdentityHierarchy<I, M>>>,
}

pub type VerifiedCoverNodeHierarchy = VerifiedProvisioningHierarchy<
    CoverNodeProvisioning,
    CoverNodeId,
    CoverNodeMessaging,
    CoverNodeIdentity,
>;

pub type VerifiedJournalistHierarchy = VerifiedProvisioningHierarchy<
    JournalistProvisioning,
    JournalistId,
    JournalistMessaging,
    JournalistIdentity,
>;

impl<P, I, M, K> VerifiedProvisioningHierarchy<P, I, M, K>
where
    P: ChildRole<Parent = Organization>,
    I: ChildRole<Parent = P>,
    M: ChildRole<Parent = I>,
    K: Ord,
{
    fn verify(
        provisioning_pk: &UntrustedKeyData,
        members: &BTreeMap<String, Vec<UntrustedIdentityFamily>>,
        org_pk: &SelfSignedPublicSigningKey<Organization>,
        parse_member: impl Fn(&str) -> Option<K>,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        let provisioning_pk = match SignedPublicSigningKey::<P>::verify(provisioning_pk, org_pk, now) {
            Ok(provisioning_pk) => provisioning_pk,
            Err(error) => {
                debug!(role = P::DISPLAY_NAME, %error, "Dropping provisioning key");
                return None;
            }
        };

        let mut verified = BTreeMap::new();
        for (name, families) in members {
            let Some(member) = parse_member(name) else {
                debug!(role = I::DISPLAY_NAME, name = %name, "Dropping member with invalid identity");
                continue;
            };

            let families: Vec<_> = families
                .iter()
                .filter_map(|family| VerifiedIdentityHierarchy::verify(family, &provisioning_pk, now))
                .collect();
            if !families.is_empty() {
                verified.insert(member, families);
            }
        }

        if verified.is_empty() {
            debug!(role = P::DISPLAY_NAME, "Dropping provisioning key without verified members");
            return None;
        }

        Some(Self {
            provisioning_pk,
            members: verified,
        })
    }

    pub fn provisioning_pk(&self) -> &SignedPublicSigningKey<P> {
        &self.provisioning_pk
    }

    pub fn members(&self) -> &BTreeMap<K, Vec<VerifiedIdentityHierarchy<I, M>>> {
        &self.members
    }
}

/// One root generation: an organization key and everything it vouches for.
#[derive(Debug, Clone)]
pub struct VerifiedPublicKeysHierarchy {
    org_pk: SelfSignedPublicSigningKey<Organization>,
    covernodes: Vec<VerifiedCoverNodeHierarchy>,
    journalists: Vec<VerifiedJournalistHierarchy>,
}

impl VerifiedPublicKeysHierarchy {
    fn verify(
        untrusted: &UntrustedOrganizationFamily,
        trusted_roots: &[PublicSigningKey<TrustedOrganization>],
        now: DateTime<Utc>,
    ) -> Result<Self, KeyError> {
        let org_pk = SelfSignedPublicSigningKey::<Organization>::verify(&untrusted.org_pk, trusted_roots, now)?;

        let covernodes: Vec<VerifiedCoverNodeHierarchy> = untrusted
            .covernodes
            .iter()
            .filter_map(|family| {
                VerifiedProvisioningHierarchy::verify(
                    &family.provisioning_pk,
                    &family.covernodes,
                    &org_pk,
                    |name| Some(CoverNodeIdentity(name.to_string())),
                    now,
                )
            })
            .collect();

        let journalists: Vec<VerifiedJournalistHierarchy> = untrusted
            .journalists
            .iter()
            .filter_map(|family| {
                VerifiedProvisioningHierarchy::verify(
                    &family.provisioning_pk,
                    &family.journalists,
                    &org_pk,
                    |name| JournalistIdentity::new(name).ok(),
                    now,
                )
            })
            .collect();

        if journalists.is_empty() {
            return Err(KeyError::NoJournalists);
        }

        Ok(Self {
            org_pk,
            covernodes,
            journalists,
        })
    }

    pub fn org_pk(&self) -> &SelfSignedPublicSigningKey<Organization> {
        &self.org_pk
    }

    pub fn covernodes(&self) -> &[VerifiedCoverNodeHierarchy] {
        &self.covernodes
    }

    pub fn journalists(&self) -> &[VerifiedJournalistHierarchy] {
        &self.journalists
    }
}

/// Every key in the public keys document that verified against the trusted
/// roots, plus the journalist profiles that came with it.
#[derive(Debug, Clone)]
pub struct VerifiedPublicKeys {
    hierarchies: Vec<VerifiedPublicKeysHierarchy>,
    journalist_profiles: Vec<JournalistProfile>,
    default_journalist_id: Option<JournalistIdentity>,
}

impl VerifiedPublicKeys {
    pub fn from_public_keys_data(
        data: &PublicKeysData,
        trusted_roots: &[PublicSigningKey<TrustedOrganization>],
        now: DateTime<Utc>,
    ) -> Result<Self, KeyError> {
        let hierarchies: Vec<_> = data
            .keys
            .iter()
            .filter_map(|family| match VerifiedPublicKeysHierarchy::verify(family, trusted_roots, now) {
                Ok(hierarchy) => Some(hierarchy),
                Err(error) => {
                    warn!(org_pk = %family.org_pk.key, %error, "Rejecting key hierarchy");
                    None
                }
            })
            .collect();

        if hierarchies.is_empty() {
            return Err(KeyError::NoValidHierarchy);
        }

        debug!(
            hierarchies = hierarchies.len(),
            profiles = data.journalist_profiles.len(),
            "Verified public keys"
        );

        Ok(Self {
            hierarchies,
            journalist_profiles: data.journalist_profiles.clone(),
            default_journalist_id: data.default_journalist_id.clone(),
        })
    }

    pub fn hierarchies(&self) -> &[VerifiedPublicKeysHierarchy] {
        &self.hierarchies
    }

    fn covernode_members(&self) -> impl Iterator<Item = (&CoverNodeIdentity, &VerifiedIdentityHierarchy<CoverNodeId, CoverNodeMessaging>)> {
        self.hierarchies
            .iter()
            .flat_map(|h| &h.covernodes)
            .flat_map(|p| &p.members)
            .flat_map(|(id, families)| families.iter().map(move |family| (id, family)))
    }

    fn journalist_families<'a>(
        &'a self,
        journalist_id: &'a JournalistIdentity,
    ) -> impl Iterator<Item = &'a VerifiedIdentityHierarchy<JournalistId, JournalistMessaging>> {
        self.hierarchies
            .iter()
            .flat_map(|h| &h.journalists)
            .filter_map(move |p| p.members.get(journalist_id))
            .flatten()
    }

    /// For every CoverNode, its newest messaging key still valid at `now`.
    /// Ordered by CoverNode identity.
    pub fn latest_covernode_messaging_keys(&self, now: DateTime<Utc>) -> Vec<PublicEncryptionKey<CoverNodeMessaging>> {
        let mut latest: BTreeMap<&CoverNodeIdentity, &SignedPublicEncryptionKey<CoverNodeMessaging>> =
            BTreeMap::new();

        for (covernode_id, family) in self.covernode_members() {
            for msg_pk in family.valid_msg_pks(now) {
                latest
                    .entry(covernode_id)
                    .and_modify(|current| {
                        if msg_pk.not_valid_after() > current.not_valid_after() {
                            *current = msg_pk;
                        }
                    })
                    .or_insert(msg_pk);
            }
        }

        latest.values().map(|msg_pk| *msg_pk.public_key()).collect()
    }

    pub fn latest_journalist_messaging_key(
        &self,
        journalist_id: &JournalistIdentity,
        now: DateTime<Utc>,
    ) -> Option<PublicEncryptionKey<JournalistMessaging>> {
        self.journalist_families(journalist_id)
            .flat_map(|family| family.valid_msg_pks(now))
            .max_by_key(|msg_pk| msg_pk.not_valid_after())
            .map(|msg_pk| *msg_pk.public_key())
    }

    /// Every verified messaging key version for a journalist, used when
    /// searching dead drops for replies.
    pub fn journalist_messaging_keys(&self, journalist_id: &JournalistIdentity) -> Vec<PublicEncryptionKey<JournalistMessaging>> {
        self.journalist_families(journalist_id)
            .flat_map(|family| family.msg_pks())
            .map(|msg_pk| *msg_pk.public_key())
            .collect()
    }

    pub fn covernode_id_keys(&self) -> Vec<PublicSigningKey<CoverNodeId>> {
        self.covernode_members()
            .map(|(_, family)| *family.id_pk().public_key())
            .collect()
    }

    pub fn journalist_ids(&self) -> Vec<&JournalistIdentity> {
        let mut ids: Vec<_> = self
            .hierarchies
            .iter()
            .flat_map(|h| &h.journalists)
            .flat_map(|p| p.members.keys())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn journalist_profiles(&self) -> &[JournalistProfile] {
        &self.journalist_profiles
    }

    pub fn journalist_profile(&self, journalist_id: &JournalistIdentity) -> Option<&JournalistProfile> {
        self.journalist_profiles
            .iter()
            .find(|profile| &profile.id == journalist_id)
    }

    pub fn default_journalist(&self) -> Option<&JournalistProfile> {
        self.default_journalist_id
            .as_ref()
            .and_then(|id| self.journalist_profile(id))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::keys::EncryptionKeyPair;
    use crate::test_utils::{TestKeyHierarchy, MESSAGING_KEY_VALIDITY_DAYS, ORGANIZATION_KEY_VALIDITY_DAYS};

    #[test]
    fn test_full_hierarchy_verifies() {
        let fixture = TestKeyHierarchy::new(Utc::now());
        let keys = VerifiedPublicKeys::from_public_keys_data(
            &fixture.public_keys_data(),
            &fixture.trusted_roots(),
            fixture.now,
        )
        .unwrap();

        assert_eq!(keys.hierarchies().len(), 1);
        assert_eq!(keys.latest_covernode_messaging_keys(fixture.now).len(), fixture.covernodes.len());
        assert_eq!(keys.covernode_id_keys().len(), fixture.covernodes.len());
        assert_eq!(keys.journalist_ids().len(), fixture.journalists.len());

        let journalist = &fixture.journalists[0];
        assert_eq!(
            keys.latest_journalist_messaging_key(&journalist.identity, fixture.now),
            Some(*journalist.messaging.public_key())
        );
        assert_eq!(keys.default_journalist().map(|p| &p.id), Some(&journalist.identity));
    }

    #[test]
    fn test_untrusted_root_rejected() {
        let fixture = TestKeyHierarchy::new(Utc::now());
        let other = TestKeyHierarchy::new(fixture.now);

        let result = VerifiedPublicKeys::from_public_keys_data(
            &fixture.public_keys_data(),
            &other.trusted_roots(),
            fixture.now,
        );
        assert!(matches!(result, Err(KeyError::NoValidHierarchy)));
    }

    #[test]
    fn test_hierarchy_without_journalists_rejected() {
        let fixture = TestKeyHierarchy::new(Utc::now());
        let mut data = fixture.public_keys_data();
        data.keys[0].journalists.clear();

        let result = VerifiedPublicKeys::from_public_keys_data(&data, &fixture.trusted_roots(), fixture.now);
        assert!(matches!(result, Err(KeyError::NoValidHierarchy)));

        let hierarchy = VerifiedPublicKeysHierarchy::verify(&data.keys[0], &fixture.trusted_roots(), fixture.now);
        assert!(matches!(hierarchy, Err(KeyError::NoJournalists)));
    }

    #[test]
    fn test_bad_key_dropped_without_aborting() {
        let fixture = TestKeyHierarchy::new(Utc::now());
        let mut data = fixture.public_keys_data();
        let forged = fixture.journalists[1].identity.as_str().to_string();
        let families = data.keys[0].journalists[0].journalists.get_mut(&forged).unwrap();
        families[0].id_pk.certificate = "00".repeat(64);

        let keys = VerifiedPublicKeys::from_public_keys_data(&data, &fixture.trusted_roots(), fixture.now).unwrap();
        assert!(keys
            .latest_journalist_messaging_key(&fixture.journalists[1].identity, fixture.now)
            .is_none());
        assert!(keys
            .latest_journalist_messaging_key(&fixture.journalists[0].identity, fixture.now)
            .is_some());
    }

    #[test]
    fn test_latest_key_prefers_newest_valid() {
        let fixture = TestKeyHierarchy::new(Utc::now());
        let mut data = fixture.public_keys_data();
        let journalist = &fixture.journalists[0];

        let newer = EncryptionKeyPair::<JournalistMessaging>::generate();
        let newer_pk = journalist
            .id_key
            .sign_encryption_key(*newer.public_key(), fixture.now + Duration::days(MESSAGING_KEY_VALIDITY_DAYS + 7));
        let expired = EncryptionKeyPair::<JournalistMessaging>::generate();
        let expired_pk = journalist
            .id_key
            .sign_encryption_key(*expired.public_key(), fixture.now - Duration::days(1));

        let families = data.keys[0].journalists[0]
            .journalists
            .get_mut(journalist.identity.as_str())
            .unwrap();
        families[0].msg_pks.push(newer_pk.to_untrusted());
        families[0].msg_pks.push(expired_pk.to_untrusted());

        let keys = VerifiedPublicKeys::from_public_keys_data(&data, &fixture.trusted_roots(), fixture.now).unwrap();
        assert_eq!(
            keys.latest_journalist_messaging_key(&journalist.identity, fixture.now),
            Some(*newer.public_key())
        );
        // The expired key never verified, so only two versions are known
        assert_eq!(keys.journalist_messaging_keys(&journalist.identity).len(), 2);

        let after_original_expiry = fixture.now + Duration::days(MESSAGING_KEY_VALIDITY_DAYS + 1);
        assert_eq!(
            keys.latest_journalist_messaging_key(&journalist.identity, after_original_expiry),
            Some(*newer.public_key())
        );
    }

    #[test]
    fn test_lookups_respect_expiry_after_verification() {
        let fixture = TestKeyHierarchy::new(Utc::now());
        let keys = fixture.verified_public_keys();
        let later = fixture.now + Duration::days(MESSAGING_KEY_VALIDITY_DAYS) + Duration::seconds(1);

        assert!(keys.latest_covernode_messaging_keys(later).is_empty());
        assert!(keys
            .latest_journalist_messaging_key(&fixture.journalists[0].identity, later)
            .is_none());
    }

    // Two root generations side by side, as during an organization key rotation
    fn two_generations(current: &TestKeyHierarchy, other: &TestKeyHierarchy) -> PublicKeysData {
        let mut data = current.public_keys_data();
        data.keys.extend(other.public_keys_data().keys);
        data
    }

    #[test]
    fn test_both_trusted_generations_kept() {
        let current = TestKeyHierarchy::new(Utc::now());
        let next = TestKeyHierarchy::new(current.now);
        let data = two_generations(&current, &next);
        let roots: Vec<_> = current.trusted_roots().into_iter().chain(next.trusted_roots()).collect();

        let keys = VerifiedPublicKeys::from_public_keys_data(&data, &roots, current.now).unwrap();
        assert_eq!(keys.hierarchies().len(), 2);

        let id_keys = keys.covernode_id_keys();
        assert_eq!(id_keys.len(), current.covernodes.len() + next.covernodes.len());
        assert!(id_keys.contains(&next.covernodes[1].id_key.public_key()));
        assert_eq!(keys.journalist_messaging_keys(&next.journalists[0].identity).len(), 2);
    }

    #[test]
    fn test_untrusted_generation_dropped_other_kept() {
        let current = TestKeyHierarchy::new(Utc::now());
        let stranger = TestKeyHierarchy::new(current.now);
        let data = two_generations(&current, &stranger);

        let keys = VerifiedPublicKeys::from_public_keys_data(&data, &current.trusted_roots(), current.now).unwrap();
        assert_eq!(keys.hierarchies().len(), 1);

        let id_keys = keys.covernode_id_keys();
        assert!(id_keys.contains(&current.covernodes[0].id_key.public_key()));
        assert!(!id_keys.contains(&stranger.covernodes[0].id_key.public_key()));
        assert_eq!(
            keys.journalist_messaging_keys(&current.journalists[0].identity),
            vec![*current.journalists[0].messaging.public_key()]
        );
    }

    #[test]
    fn test_expired_generation_dropped_other_kept() {
        let current = TestKeyHierarchy::new(Utc::now());
        let retired = TestKeyHierarchy::new(current.now - Duration::days(ORGANIZATION_KEY_VALIDITY_DAYS + 1));
        let data = two_generations(&current, &retired);
        let roots: Vec<_> = current.trusted_roots().into_iter().chain(retired.trusted_roots()).collect();

        let keys = VerifiedPublicKeys::from_public_keys_data(&data, &roots, current.now).unwrap();
        assert_eq!(keys.hierarchies().len(), 1);
        assert_eq!(*keys.hierarchies()[0].org_pk().public_key(), current.org.public_key());
        assert!(!keys.covernode_id_keys().contains(&retired.covernodes[0].id_key.public_key()));

        // Alone, the retired generation leaves nothing
        let result = VerifiedPublicKeys::from_public_keys_data(&retired.public_keys_data(), &roots, current.now);
        assert!(matches!(result, Err(KeyError::NoValidHierarchy)));
    }
}
