//! Dead drops: signed bundles of journalist replies published by the
//! CoverNode.
//!
//! Every user downloads every dead drop and tries to open every chunk with
//! the keys of the journalists it has written to. A chunk that does not open
//! is somebody else's message and is silently ignored.

use std::collections::BTreeSet;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::api::{DeadDropData, UntrustedDeadDrop};
use crate::constants::{JOURNALIST_TO_USER_ENCRYPTED_MESSAGE_LEN, MAX_DEAD_DROP_FUTURE_SKEW_DAYS};
use crate::crypto::TwoPartyBox;
use crate::hierarchy::VerifiedPublicKeys;
use crate::keys::{CoverNodeId, EncryptionKeyPair, JournalistMessaging, PublicEncryptionKey, PublicSigningKey, Signature, SigningKeyPair, User};
use crate::protocol::{EncryptedJournalistToUserMessage, JournalistToUserMessage};
use crate::types::JournalistIdentity;

/// Which dead drop signatures are accepted.
///
/// Dead drops historically carried only `cert`, a signature over the raw
/// data. The timestamped `signature` also binds `created_at`, so a replayed
/// drop cannot be re-dated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadDropSignatureMode {
    /// Verify the timestamped signature when present, otherwise `cert`
    #[default]
    Compatible,
    /// Require the timestamped signature
    TimestampedOnly,
}

/// The digest the timestamped signature is made over.
pub fn timestamped_signature_payload(data: &[u8], created_at: DateTime<Utc>) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.update((created_at.timestamp().max(0) as u64).to_be_bytes());
    hasher.finalize().into()
}

/// CoverNode side: publish chunks as a dead drop carrying both signatures.
pub fn sign_dead_drop(
    id: u32,
    created_at: DateTime<Utc>,
    messages: &[EncryptedJournalistToUserMessage],
    covernode_id: &SigningKeyPair<CoverNodeId>,
) -> UntrustedDeadDrop {
    let data: Vec<u8> = messages
        .iter()
        .flat_map(|message| message.as_bytes().iter().copied())
        .collect();

    let cert = covernode_id.sign(&data);
    let signature = covernode_id.sign(&timestamped_signature_payload(&data, created_at));

    UntrustedDeadDrop {
        id,
        created_at: created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        data: BASE64.encode(&data),
        cert: cert.to_hex(),
        signature: Some(signature.to_hex()),
    }
}

#[derive(Debug, Error)]
enum DeadDropRejection {
    #[error("data is not valid base64")]
    Base64(#[from] base64::DecodeError),
    #[error("created_at is not RFC 3339: {0}")]
    Timestamp(#[from] chrono::ParseError),
    #[error("signature is malformed")]
    MalformedSignature,
    #[error("timestamped signature required but missing")]
    MissingTimestampedSignature,
    #[error("no CoverNode id key verifies the signature")]
    SignatureVerificationFailed,
    #[error("created_at {0} is too far in the future")]
    TooFarInFuture(DateTime<Utc>),
    #[error("data length {0} is not a whole number of messages")]
    InvalidLength(usize),
}

#[derive(Debug, Clone)]
pub struct VerifiedDeadDrop {
    id: u32,
    created_at: DateTime<Utc>,
    messages: Vec<EncryptedJournalistToUserMessage>,
}

impl VerifiedDeadDrop {
    fn verify(
        untrusted: &UntrustedDeadDrop,
        covernode_id_keys: &[PublicSigningKey<CoverNodeId>],
        now: DateTime<Utc>,
        mode: DeadDropSignatureMode,
    ) -> Result<Self, DeadDropRejection> {
        let data = BASE64.decode(untrusted.data.trim())?;
        let created_at = DateTime::parse_from_rfc3339(&untrusted.created_at)?.with_timezone(&Utc);

        let (signed, signature) = match (&untrusted.signature, mode) {
            (Some(signature), _) => (
                timestamped_signature_payload(&data, created_at).to_vec(),
                signature.as_str(),
            ),
            (None, DeadDropSignatureMode::Compatible) => (data.clone(), untrusted.cert.as_str()),
            (None, DeadDropSignatureMode::TimestampedOnly) => {
                return Err(DeadDropRejection::MissingTimestampedSignature)
            }
        };
        let signature = Signature::<CoverNodeId>::from_hex(signature)
            .map_err(|_| DeadDropRejection::MalformedSignature)?;

        if !covernode_id_keys
            .iter()
            .any(|key| key.verify(&signed, &signature).is_ok())
        {
            return Err(DeadDropRejection::SignatureVerificationFailed);
        }

        if created_at > now + Duration::days(MAX_DEAD_DROP_FUTURE_SKEW_DAYS) {
            return Err(DeadDropRejection::TooFarInFuture(created_at));
        }

        if data.is_empty() || data.len() % JOURNALIST_TO_USER_ENCRYPTED_MESSAGE_LEN != 0 {
            return Err(DeadDropRejection::InvalidLength(data.len()));
        }

        let messages = data
            .chunks_exact(JOURNALIST_TO_USER_ENCRYPTED_MESSAGE_LEN)
            .map(|chunk| TwoPartyBox::from_vec_unchecked(chunk.to_vec()))
            .collect();

        Ok(Self {
            id: untrusted.id,
            created_at,
            messages,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn messages(&self) -> &[EncryptedJournalistToUserMessage] {
        &self.messages
    }
}

#[derive(Debug, Clone, Default)]
pub struct VerifiedDeadDrops {
    dead_drops: Vec<VerifiedDeadDrop>,
}

impl VerifiedDeadDrops {
    /// Keep the drops that verify; each rejected drop is logged and skipped.
    pub fn from_dead_drop_data(
        data: &DeadDropData,
        keys: &VerifiedPublicKeys,
        now: DateTime<Utc>,
        mode: DeadDropSignatureMode,
    ) -> Self {
        let covernode_id_keys = keys.covernode_id_keys();

        let dead_drops = data
            .dead_drops
            .iter()
            .filter_map(|untrusted| {
                match VerifiedDeadDrop::verify(untrusted, &covernode_id_keys, now, mode) {
                    Ok(dead_drop) => Some(dead_drop),
                    Err(error) => {
                        debug!(id = untrusted.id, %error, "Dropping dead drop");
                        None
                    }
                }
            })
            .collect();

        Self { dead_drops }
    }

    pub fn dead_drops(&self) -> &[VerifiedDeadDrop] {
        &self.dead_drops
    }

    pub fn len(&self) -> usize {
        self.dead_drops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dead_drops.is_empty()
    }

    pub fn max_id(&self) -> Option<u32> {
        self.dead_drops.iter().map(|dead_drop| dead_drop.id).max()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum Message {
    Text(String),
    Handover(JournalistIdentity),
}

/// A decrypted reply. Ordered by arrival so a set iterates chronologically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReceivedMessage {
    pub received_at: DateTime<Utc>,
    pub journalist_id: JournalistIdentity,
    pub message: Message,
}

#[derive(Debug, Clone, Default)]
pub struct DecryptedDeadDrops {
    messages: BTreeSet<ReceivedMessage>,
    max_dead_drop_id: Option<u32>,
}

impl DecryptedDeadDrops {
    /// Try every chunk against every messaging key version of every
    /// journalist in `journalists`.
    pub fn decrypt<'a>(
        dead_drops: &VerifiedDeadDrops,
        user: &EncryptionKeyPair<User>,
        journalists: impl IntoIterator<Item = &'a JournalistIdentity>,
        keys: &VerifiedPublicKeys,
    ) -> Self {
        let candidates: Vec<(&JournalistIdentity, Vec<PublicEncryptionKey<JournalistMessaging>>)> = journalists
            .into_iter()
            .map(|journalist_id| (journalist_id, keys.journalist_messaging_keys(journalist_id)))
            .filter(|(_, msg_pks)| !msg_pks.is_empty())
            .collect();

        let chunks: Vec<(&VerifiedDeadDrop, &EncryptedJournalistToUserMessage)> = dead_drops
            .dead_drops
            .iter()
            .flat_map(|dead_drop| dead_drop.messages.iter().map(move |message| (dead_drop, message)))
            .collect();

        let messages: BTreeSet<ReceivedMessage> = chunks
            .par_iter()
            .filter_map(|(dead_drop, encrypted)| {
                candidates.iter().find_map(|(journalist_id, msg_pks)| {
                    let decrypted = msg_pks.iter().find_map(|msg_pk| {
                        TwoPartyBox::<JournalistToUserMessage>::decrypt(msg_pk, user.secret_key(), encrypted).ok()
                    })?;
                    let message = match decrypted {
                        JournalistToUserMessage::Message(text) => Message::Text(text.to_string().ok()?),
                        JournalistToUserMessage::HandOver(journalist_id) => Message::Handover(journalist_id),
                    };
                    Some(ReceivedMessage {
                        received_at: dead_drop.created_at,
                        journalist_id: (*journalist_id).clone(),
                        message,
                    })
                })
            })
            .collect();

        debug!(
            dead_drops = dead_drops.len(),
            chunks = chunks.len(),
            found = messages.len(),
            "Searched dead drops"
        );

        Self {
            messages,
            max_dead_drop_id: dead_drops.max_id(),
        }
    }

    pub fn messages(&self) -> &BTreeSet<ReceivedMessage> {
        &self.messages
    }

    pub fn into_messages(self) -> BTreeSet<ReceivedMessage> {
        self.messages
    }

    pub fn max_dead_drop_id(&self) -> Option<u32> {
        self.max_dead_drop_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encodable::Encodable;
    use crate::test_utils::TestKeyHierarchy;

    fn reply(
        fixture: &TestKeyHierarchy,
        journalist: usize,
        user: &EncryptionKeyPair<User>,
        message: JournalistToUserMessage,
    ) -> EncryptedJournalistToUserMessage {
        message
            .encrypt(user.public_key(), fixture.journalists[journalist].messaging.secret_key())
            .unwrap()
    }

    fn verify(fixture: &TestKeyHierarchy, dead_drops: Vec<UntrustedDeadDrop>, mode: DeadDropSignatureMode) -> VerifiedDeadDrops {
        VerifiedDeadDrops::from_dead_drop_data(
            &DeadDropData { dead_drops },
            &fixture.verified_public_keys(),
            fixture.now,
            mode,
        )
    }

    #[test]
    fn test_reply_and_handover_roundtrip() {
        let fixture = TestKeyHierarchy::new(Utc::now());
        let user = EncryptionKeyPair::<User>::generate();
        let other_user = EncryptionKeyPair::<User>::generate();
        let journalist = &fixture.journalists[0];
        let desk = fixture.journalists[1].identity.clone();

        let chunks = vec![
            reply(&fixture, 0, &user, JournalistToUserMessage::new_with_string("hello back").unwrap()),
            reply(&fixture, 0, &other_user, JournalistToUserMessage::new_with_string("not yours").unwrap()),
            reply(&fixture, 0, &user, JournalistToUserMessage::HandOver(desk.clone())),
        ];
        let dead_drop = sign_dead_drop(7, fixture.now, &chunks, &fixture.covernodes[0].id_key);
        let verified = verify(&fixture, vec![dead_drop], DeadDropSignatureMode::Compatible);
        assert_eq!(verified.len(), 1);
        assert_eq!(verified.dead_drops()[0].messages().len(), 3);

        let decrypted = DecryptedDeadDrops::decrypt(
            &verified,
            &user,
            [&journalist.identity],
            &fixture.verified_public_keys(),
        );
        assert_eq!(decrypted.max_dead_drop_id(), Some(7));

        let messages: Vec<_> = decrypted.messages().iter().map(|m| m.message.clone()).collect();
        assert_eq!(messages.len(), 2);
        assert!(messages.contains(&Message::Text("hello back".to_string())));
        assert!(messages.contains(&Message::Handover(desk)));
        assert!(decrypted.messages().iter().all(|m| m.journalist_id == journalist.identity));
    }

    #[test]
    fn test_uncontacted_journalist_not_searched() {
        let fixture = TestKeyHierarchy::new(Utc::now());
        let user = EncryptionKeyPair::<User>::generate();
        let chunks = vec![reply(&fixture, 1, &user, JournalistToUserMessage::new_with_string("hi").unwrap())];
        let verified = verify(
            &fixture,
            vec![sign_dead_drop(1, fixture.now, &chunks, &fixture.covernodes[0].id_key)],
            DeadDropSignatureMode::Compatible,
        );

        let decrypted = DecryptedDeadDrops::decrypt(
            &verified,
            &user,
            [&fixture.journalists[0].identity],
            &fixture.verified_public_keys(),
        );
        assert!(decrypted.messages().is_empty());
    }

    #[test]
    fn test_duplicate_replies_collapse() {
        let fixture = TestKeyHierarchy::new(Utc::now());
        let user = EncryptionKeyPair::<User>::generate();
        let message = JournalistToUserMessage::new_with_string("same").unwrap();
        let chunks = vec![
            reply(&fixture, 0, &user, message.clone()),
            reply(&fixture, 0, &user, message),
        ];
        let verified = verify(
            &fixture,
            vec![sign_dead_drop(1, fixture.now, &chunks, &fixture.covernodes[0].id_key)],
            DeadDropSignatureMode::Compatible,
        );

        let decrypted = DecryptedDeadDrops::decrypt(
            &verified,
            &user,
            [&fixture.journalists[0].identity],
            &fixture.verified_public_keys(),
        );
        assert_eq!(decrypted.messages().len(), 1);
    }

    #[test]
    fn test_bad_message_tag_silently_dropped() {
        let fixture = TestKeyHierarchy::new(Utc::now());
        let user = EncryptionKeyPair::<User>::generate();

        let mut plaintext = JournalistToUserMessage::new_with_string("x").unwrap().as_unencrypted_bytes();
        plaintext[0] = 0x42;
        let bogus = TwoPartyBox::<Vec<u8>>::encrypt(
            user.public_key(),
            fixture.journalists[0].messaging.secret_key(),
            &plaintext,
        )
        .unwrap();
        let chunks = vec![
            TwoPartyBox::from_vec_unchecked(bogus.into_bytes()),
            reply(&fixture, 0, &user, JournalistToUserMessage::new_with_string("fine").unwrap()),
        ];
        let verified = verify(
            &fixture,
            vec![sign_dead_drop(1, fixture.now, &chunks, &fixture.covernodes[0].id_key)],
            DeadDropSignatureMode::Compatible,
        );

        let decrypted = DecryptedDeadDrops::decrypt(
            &verified,
            &user,
            [&fixture.journalists[0].identity],
            &fixture.verified_public_keys(),
        );
        let messages: Vec<_> = decrypted.into_messages().into_iter().map(|m| m.message).collect();
        assert_eq!(messages, vec![Message::Text("fine".to_string())]);
    }

    #[test]
    fn test_future_skew_boundary() {
        let fixture = TestKeyHierarchy::new(Utc::now());
        let user = EncryptionKeyPair::<User>::generate();
        let chunks = vec![reply(&fixture, 0, &user, JournalistToUserMessage::new_with_string("hi").unwrap())];
        let id_key = &fixture.covernodes[0].id_key;
        let limit = fixture.now + Duration::days(MAX_DEAD_DROP_FUTURE_SKEW_DAYS);

        let verified = verify(
            &fixture,
            vec![
                sign_dead_drop(1, limit, &chunks, id_key),
                sign_dead_drop(2, limit + Duration::seconds(1), &chunks, id_key),
            ],
            DeadDropSignatureMode::Compatible,
        );
        let ids: Vec<_> = verified.dead_drops().iter().map(|d| d.id()).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_signature_modes() {
        let fixture = TestKeyHierarchy::new(Utc::now());
        let user = EncryptionKeyPair::<User>::generate();
        let chunks = vec![reply(&fixture, 0, &user, JournalistToUserMessage::new_with_string("hi").unwrap())];

        let mut legacy = sign_dead_drop(1, fixture.now, &chunks, &fixture.covernodes[0].id_key);
        legacy.signature = None;

        assert_eq!(verify(&fixture, vec![legacy.clone()], DeadDropSignatureMode::Compatible).len(), 1);
        assert!(verify(&fixture, vec![legacy], DeadDropSignatureMode::TimestampedOnly).is_empty());

        let full = sign_dead_drop(2, fixture.now, &chunks, &fixture.covernodes[0].id_key);
        assert_eq!(verify(&fixture, vec![full], DeadDropSignatureMode::TimestampedOnly).len(), 1);
    }

    #[test]
    fn test_redated_drop_rejected() {
        let fixture = TestKeyHierarchy::new(Utc::now());
        let user = EncryptionKeyPair::<User>::generate();
        let chunks = vec![reply(&fixture, 0, &user, JournalistToUserMessage::new_with_string("hi").unwrap())];

        let mut redated = sign_dead_drop(1, fixture.now, &chunks, &fixture.covernodes[0].id_key);
        redated.created_at = (fixture.now - Duration::days(30)).to_rfc3339();
        assert!(verify(&fixture, vec![redated], DeadDropSignatureMode::Compatible).is_empty());
    }

    #[test]
    fn test_forged_or_malformed_drops_rejected() {
        let fixture = TestKeyHierarchy::new(Utc::now());
        let user = EncryptionKeyPair::<User>::generate();
        let chunks = vec![reply(&fixture, 0, &user, JournalistToUserMessage::new_with_string("hi").unwrap())];

        let forger = SigningKeyPair::<CoverNodeId>::generate();
        let forged = sign_dead_drop(1, fixture.now, &chunks, &forger);

        let mut truncated = sign_dead_drop(2, fixture.now, &chunks, &fixture.covernodes[0].id_key);
        let mut data = BASE64.decode(&truncated.data).unwrap();
        data.pop();
        truncated.data = BASE64.encode(&data);
        truncated.cert = fixture.covernodes[0].id_key.sign(&data).to_hex();
        truncated.signature = None;

        let empty = sign_dead_drop(3, fixture.now, &[], &fixture.covernodes[0].id_key);

        let mut garbage = sign_dead_drop(4, fixture.now, &chunks, &fixture.covernodes[0].id_key);
        garbage.data = "not base64!".to_string();

        let verified = verify(
            &fixture,
            vec![forged, truncated, empty, garbage],
            DeadDropSignatureMode::Compatible,
        );
        assert!(verified.is_empty());
    }

    #[test]
    fn test_drop_signed_in_second_generation_verifies() {
        let current = TestKeyHierarchy::new(Utc::now());
        let next = TestKeyHierarchy::new(current.now);
        let user = EncryptionKeyPair::<User>::generate();

        let mut data = current.public_keys_data();
        data.keys.extend(next.public_keys_data().keys);
        let roots: Vec<_> = current.trusted_roots().into_iter().chain(next.trusted_roots()).collect();
        let keys = VerifiedPublicKeys::from_public_keys_data(&data, &roots, current.now).unwrap();

        let chunks = vec![reply(&next, 0, &user, JournalistToUserMessage::new_with_string("rotated").unwrap())];
        let dead_drops = DeadDropData {
            dead_drops: vec![sign_dead_drop(1, current.now, &chunks, &next.covernodes[1].id_key)],
        };

        let verified =
            VerifiedDeadDrops::from_dead_drop_data(&dead_drops, &keys, current.now, DeadDropSignatureMode::Compatible);
        assert_eq!(verified.len(), 1);

        // Replies under the second generation's journalist key are found too
        let decrypted = DecryptedDeadDrops::decrypt(&verified, &user, [&next.journalists[0].identity], &keys);
        let messages: Vec<_> = decrypted.into_messages().into_iter().map(|m| m.message).collect();
        assert_eq!(messages, vec![Message::Text("rotated".to_string())]);

        // Without the second root the same drop is rejected
        let current_only = current.verified_public_keys();
        assert!(VerifiedDeadDrops::from_dead_drop_data(
            &dead_drops,
            &current_only,
            current.now,
            DeadDropSignatureMode::Compatible
        )
        .is_empty());
    }
}
