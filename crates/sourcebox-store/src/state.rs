//! The user's long-lived client state.
//!
//! [`UserState`] holds the reply key pair, the sending queue secret, the
//! journalists the user has written to and every message received so far.
//! It is only ever written to a [`BlobStore`] sealed under a [`StorageKey`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sourcebox_shared::keys::{EncryptionKeyPair, User};
use sourcebox_shared::api::DeadDropData;
use sourcebox_shared::{
    DecryptedDeadDrops, JournalistIdentity, Message, PrivateSendingQueue, PrivateSendingQueueSecret,
    ReceivedMessage, VerifiedDeadDrops, VerifiedPublicKeys,
};
use tracing::debug;
use zeroize::Zeroizing;

use crate::blob::BlobStore;
use crate::error::Result;
use crate::key::StorageKey;

pub const USER_STATE_BLOB: &str = "user_state";
pub const SENDING_QUEUE_BLOB: &str = "sending_queue";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserState {
    user_key_pair: EncryptionKeyPair<User>,
    queue_secret: PrivateSendingQueueSecret,
    journalists: BTreeSet<JournalistIdentity>,
    messages: BTreeSet<ReceivedMessage>,
    last_dead_drop_id: Option<u32>,
    /// Drops that failed verification; retried on every receive.
    #[serde(default)]
    rejected_dead_drop_ids: BTreeSet<u32>,
}

impl UserState {
    /// Fresh state with a new reply key pair and queue secret.
    pub fn generate() -> Self {
        Self {
            user_key_pair: EncryptionKeyPair::generate(),
            queue_secret: PrivateSendingQueueSecret::generate(),
            journalists: BTreeSet::new(),
            messages: BTreeSet::new(),
            last_dead_drop_id: None,
            rejected_dead_drop_ids: BTreeSet::new(),
        }
    }

    pub fn user_key_pair(&self) -> &EncryptionKeyPair<User> {
        &self.user_key_pair
    }

    pub fn queue_secret(&self) -> &PrivateSendingQueueSecret {
        &self.queue_secret
    }

    pub fn journalists(&self) -> &BTreeSet<JournalistIdentity> {
        &self.journalists
    }

    pub fn messages(&self) -> &BTreeSet<ReceivedMessage> {
        &self.messages
    }

    /// Highest dead drop id already processed.
    pub fn last_dead_drop_id(&self) -> Option<u32> {
        self.last_dead_drop_id
    }

    /// Returns `true` if the journalist was not known yet.
    pub fn remember_journalist(&mut self, id: JournalistIdentity) -> bool {
        self.journalists.insert(id)
    }

    pub fn rejected_dead_drop_ids(&self) -> &BTreeSet<u32> {
        &self.rejected_dead_drop_ids
    }

    /// The part of `data` still to be processed: drops above the highest id
    /// seen so far plus drops that failed verification before.
    pub fn unprocessed_dead_drops(&self, data: &DeadDropData) -> DeadDropData {
        DeadDropData {
            dead_drops: data
                .dead_drops
                .iter()
                .filter(|dead_drop| {
                    self.last_dead_drop_id.map_or(true, |last| dead_drop.id > last)
                        || self.rejected_dead_drop_ids.contains(&dead_drop.id)
                })
                .cloned()
                .collect(),
        }
    }

    /// Record the outcome of verifying `offered` and merge every message
    /// found in `verified`, returning how many were new.
    ///
    /// A handover makes the new journalist a known correspondent. The drops
    /// are searched again until no handover adds anyone, so a reply sitting
    /// next to the handover that introduced its sender is found as well.
    pub fn merge_dead_drops(
        &mut self,
        offered: &DeadDropData,
        verified: &VerifiedDeadDrops,
        keys: &VerifiedPublicKeys,
    ) -> usize {
        let verified_ids: BTreeSet<u32> = verified.dead_drops().iter().map(|dead_drop| dead_drop.id()).collect();
        for dead_drop in &offered.dead_drops {
            if verified_ids.contains(&dead_drop.id) {
                self.rejected_dead_drop_ids.remove(&dead_drop.id);
            } else {
                self.rejected_dead_drop_ids.insert(dead_drop.id);
            }
        }

        let mut new_messages = 0;
        loop {
            let known = self.journalists.len();
            let decrypted = DecryptedDeadDrops::decrypt(verified, &self.user_key_pair, &self.journalists, keys);
            new_messages += self.merge_received(decrypted);
            if self.journalists.len() == known {
                break;
            }
            debug!(journalists = self.journalists.len(), "Handover found, searching dead drops again");
        }
        new_messages
    }

    fn merge_received(&mut self, decrypted: DecryptedDeadDrops) -> usize {
        if let Some(id) = decrypted.max_dead_drop_id() {
            self.last_dead_drop_id = Some(self.last_dead_drop_id.map_or(id, |last| last.max(id)));
        }

        let before = self.messages.len();
        for received in decrypted.into_messages() {
            if let Message::Handover(to) = &received.message {
                self.journalists.insert(to.clone());
            }
            self.messages.insert(received);
        }
        self.messages.len() - before
    }

    pub fn seal(&self, key: &StorageKey) -> Result<Vec<u8>> {
        let json = Zeroizing::new(serde_json::to_vec(self)?);
        key.seal(&json)
    }

    pub fn open(sealed: &[u8], key: &StorageKey) -> Result<Self> {
        let json = key.open(sealed)?;
        Ok(serde_json::from_slice(&json)?)
    }

    pub fn load(store: &dyn BlobStore, key: &StorageKey) -> Result<Option<Self>> {
        store
            .load(USER_STATE_BLOB)?
            .map(|sealed| Self::open(&sealed, key))
            .transpose()
    }

    pub fn save(&self, store: &dyn BlobStore, key: &StorageKey) -> Result<()> {
        store.save(USER_STATE_BLOB, &self.seal(key)?)?;
        debug!(
            journalists = self.journalists.len(),
            messages = self.messages.len(),
            "Saved user state"
        );
        Ok(())
    }
}

pub fn save_sending_queue(
    store: &dyn BlobStore,
    key: &StorageKey,
    queue: &PrivateSendingQueue,
) -> Result<()> {
    store.save(SENDING_QUEUE_BLOB, &key.seal(&queue.serialize())?)
}

pub fn load_sending_queue(
    store: &dyn BlobStore,
    key: &StorageKey,
    message_size: usize,
) -> Result<Option<PrivateSendingQueue>> {
    let Some(sealed) = store.load(SENDING_QUEUE_BLOB)? else {
        return Ok(None);
    };

    let bytes = key.open(&sealed)?;
    Ok(Some(PrivateSendingQueue::deserialize(&bytes, message_size)?))
}
