//! A source's client session.
//!
//! [`Session`] ties the protocol core to storage: it verifies key documents,
//! queues outgoing messages, hands out the next message to send and merges
//! replies found in dead drops. Every change is written to the blob store
//! before the call returns.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sourcebox_shared::api::{DeadDropData, PublicKeysData};
use sourcebox_shared::constants::{PRIVATE_SENDING_QUEUE_SIZE, USER_TO_COVERNODE_ENCRYPTED_MESSAGE_LEN};
use sourcebox_shared::keys::{PublicSigningKey, TrustedOrganization};
use sourcebox_shared::{
    create_message, CoverNodeCoverMessageFactory, EncryptedUserToCoverNodeMessage,
    JournalistIdentity, PrivateSendingQueue, ReceivedMessage, VerifiedDeadDrops, VerifiedPublicKeys,
};
use sourcebox_store::state::SENDING_QUEUE_BLOB;
use sourcebox_store::{load_sending_queue, save_sending_queue, BlobStore, StorageKey, UserState};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::queue_handle::SendingQueueHandle;

const PUBLIC_KEYS_BLOB: &str = "public_keys";

pub struct Session<S: BlobStore> {
    config: ClientConfig,
    store: S,
    storage_key: StorageKey,
    trusted_roots: Vec<PublicSigningKey<TrustedOrganization>>,
    state: UserState,
    public_keys: Option<VerifiedPublicKeys>,
    queue: Option<SendingQueueHandle>,
}

impl<S: BlobStore> Session<S> {
    /// Open the session stored in `store`, creating fresh state if there is
    /// none yet.
    ///
    /// A previously cached key document is re-verified against
    /// `trusted_roots` at `now`; if it no longer verifies the session starts
    /// without keys and [`refresh_public_keys`](Self::refresh_public_keys)
    /// has to be called before sending.
    pub fn open(
        config: ClientConfig,
        store: S,
        storage_key: StorageKey,
        trusted_roots: Vec<PublicSigningKey<TrustedOrganization>>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if trusted_roots.is_empty() {
            return Err(ClientError::NoTrustedRoots);
        }

        let state = match UserState::load(&store, &storage_key)? {
            Some(state) => {
                info!(journalists = state.journalists().len(), "Opened existing session");
                state
            }
            None => {
                let state = UserState::generate();
                state.save(&store, &storage_key)?;
                info!("Created new session");
                state
            }
        };

        let queue = load_sending_queue(&store, &storage_key, USER_TO_COVERNODE_ENCRYPTED_MESSAGE_LEN)?
            .map(SendingQueueHandle::new);

        let mut session = Self {
            config,
            store,
            storage_key,
            trusted_roots,
            state,
            public_keys: None,
            queue,
        };

        if let Some(json) = session.store.load(PUBLIC_KEYS_BLOB)? {
            let data: PublicKeysData = serde_json::from_slice(&json)?;
            if let Err(e) = session.install_public_keys(&data, now) {
                warn!(error = %e, "Cached public keys no longer verify");
            }
        }

        Ok(session)
    }

    /// Verify a freshly downloaded key document and switch to it.
    ///
    /// On failure the previously verified keys stay in use.
    pub fn refresh_public_keys(&mut self, data: &PublicKeysData, now: DateTime<Utc>) -> Result<()> {
        self.install_public_keys(data, now)?;
        self.store.save(PUBLIC_KEYS_BLOB, &serde_json::to_vec(data)?)?;
        Ok(())
    }

    fn install_public_keys(&mut self, data: &PublicKeysData, now: DateTime<Utc>) -> Result<()> {
        let keys = VerifiedPublicKeys::from_public_keys_data(data, &self.trusted_roots, now)?;
        info!(
            hierarchies = keys.hierarchies().len(),
            journalists = keys.journalist_ids().len(),
            "Public keys verified"
        );

        if self.queue.is_none() {
            self.queue = Some(self.fresh_queue(&keys, now)?);
        }

        self.public_keys = Some(keys);
        Ok(())
    }

    pub fn public_keys(&self) -> Option<&VerifiedPublicKeys> {
        self.public_keys.as_ref()
    }

    /// Encrypt `text` for a journalist and put it in the sending queue.
    pub fn send_message(
        &mut self,
        text: &str,
        journalist_id: &JournalistIdentity,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let (keys, queue) = self.keys_and_queue()?;
        let profile = keys
            .journalist_profile(journalist_id)
            .ok_or_else(|| ClientError::UnknownJournalist(journalist_id.as_str().to_string()))?;

        let message = create_message(text, profile, keys, self.state.user_key_pair().public_key(), now)?;

        queue.enqueue(self.state.queue_secret(), message, |queue| {
            save_sending_queue(&self.store, &self.storage_key, queue)
        })?;

        if self.state.remember_journalist(journalist_id.clone()) {
            self.state.save(&self.store, &self.storage_key)?;
        }

        info!(journalist = %journalist_id.as_str(), "Message queued");
        Ok(())
    }

    /// The message to put on the wire next, real or cover.
    pub fn next_outbound(&self) -> Result<Option<EncryptedUserToCoverNodeMessage>> {
        match &self.queue {
            Some(queue) => queue.peek(),
            None => Ok(None),
        }
    }

    /// Drop `sent`, the message returned by
    /// [`next_outbound`](Self::next_outbound), after it went out, refilling
    /// the queue with cover.
    ///
    /// If the queue front changed in the meantime nothing is removed and
    /// [`ClientError::SentMessageNotAtFront`] is returned; the caller peeks
    /// again.
    pub fn confirm_sent(&self, sent: &EncryptedUserToCoverNodeMessage, now: DateTime<Utc>) -> Result<()> {
        let (keys, queue) = self.keys_and_queue()?;
        let factory = CoverNodeCoverMessageFactory::new(keys, now);

        queue.dequeue_and_refill(sent, &factory, |queue| {
            save_sending_queue(&self.store, &self.storage_key, queue)
        })
    }

    /// Number of real messages still waiting in the queue.
    pub fn pending_message_count(&self) -> Result<usize> {
        match &self.queue {
            Some(queue) => queue.fill_level(self.state.queue_secret()),
            None => Ok(0),
        }
    }

    /// Verify and decrypt dead drops not processed yet, returning how many
    /// new messages were stored.
    ///
    /// A drop that fails verification, for example because it is signed by
    /// a CoverNode key missing from the cached key document, is offered
    /// again on later calls until it verifies.
    pub fn receive_dead_drops(&mut self, data: &DeadDropData, now: DateTime<Utc>) -> Result<usize> {
        let keys = self.public_keys.as_ref().ok_or(ClientError::PublicKeysNotLoaded)?;

        let unprocessed = self.state.unprocessed_dead_drops(data);
        if unprocessed.dead_drops.is_empty() {
            debug!(offered = data.dead_drops.len(), "No new dead drops");
            return Ok(0);
        }

        let verified =
            VerifiedDeadDrops::from_dead_drop_data(&unprocessed, keys, now, self.config.dead_drop_signature_mode);
        let new_messages = self.state.merge_dead_drops(&unprocessed, &verified, keys);
        self.state.save(&self.store, &self.storage_key)?;

        info!(
            dead_drops = verified.len(),
            rejected = unprocessed.dead_drops.len() - verified.len(),
            new_messages,
            "Processed dead drops"
        );
        Ok(new_messages)
    }

    pub fn messages(&self) -> &BTreeSet<ReceivedMessage> {
        self.state.messages()
    }

    pub fn journalists(&self) -> &BTreeSet<JournalistIdentity> {
        self.state.journalists()
    }

    /// Replace the user state and the sending queue with fresh ones.
    ///
    /// The cached public keys are not secret and stay in place.
    pub fn wipe(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.store.delete(SENDING_QUEUE_BLOB)?;
        self.queue = None;

        self.state = UserState::generate();
        self.state.save(&self.store, &self.storage_key)?;

        if let Some(keys) = &self.public_keys {
            self.queue = Some(self.fresh_queue(keys, now)?);
        }

        info!("Session wiped");
        Ok(())
    }

    // Cover messages are needed once, when the queue is first filled
    fn fresh_queue(&self, keys: &VerifiedPublicKeys, now: DateTime<Utc>) -> Result<SendingQueueHandle> {
        let factory = CoverNodeCoverMessageFactory::new(keys, now);
        let queue = PrivateSendingQueue::new(
            PRIVATE_SENDING_QUEUE_SIZE,
            USER_TO_COVERNODE_ENCRYPTED_MESSAGE_LEN,
            &factory,
        )?;
        save_sending_queue(&self.store, &self.storage_key, &queue)?;

        debug!("Initialised sending queue");
        Ok(SendingQueueHandle::new(queue))
    }

    fn keys_and_queue(&self) -> Result<(&VerifiedPublicKeys, &SendingQueueHandle)> {
        match (&self.public_keys, &self.queue) {
            (Some(keys), Some(queue)) => Ok((keys, queue)),
            _ => Err(ClientError::PublicKeysNotLoaded),
        }
    }
}
