//! Shared access to the private sending queue.
//!
//! Mutations run on a copy of the queue under the write lock. The copy is
//! checked and persisted before it replaces the live queue, so a failed
//! operation leaves the previous queue in place.

use std::sync::RwLock;

use sourcebox_shared::protocol::CoverMessageFactory;
use sourcebox_shared::{EncryptedUserToCoverNodeMessage, PrivateSendingQueue, PrivateSendingQueueSecret};
use sourcebox_store::StoreError;

use crate::error::{ClientError, Result};

#[derive(Debug)]
pub struct SendingQueueHandle {
    queue: RwLock<PrivateSendingQueue>,
}

impl SendingQueueHandle {
    pub fn new(queue: PrivateSendingQueue) -> Self {
        Self {
            queue: RwLock::new(queue),
        }
    }

    pub fn enqueue(
        &self,
        secret: &PrivateSendingQueueSecret,
        message: EncryptedUserToCoverNodeMessage,
        persist: impl FnOnce(&PrivateSendingQueue) -> std::result::Result<(), StoreError>,
    ) -> Result<()> {
        self.update(persist, |queue| Ok(queue.enqueue(secret, message)?))
    }

    /// Remove `sent` from the front of the queue and append a fresh cover
    /// message.
    ///
    /// Fails with [`ClientError::SentMessageNotAtFront`] if the front changed
    /// since `sent` was peeked, for example because a real message was
    /// enqueued in between. Nothing is removed in that case.
    pub fn dequeue_and_refill(
        &self,
        sent: &EncryptedUserToCoverNodeMessage,
        cover_factory: &dyn CoverMessageFactory,
        persist: impl FnOnce(&PrivateSendingQueue) -> std::result::Result<(), StoreError>,
    ) -> Result<()> {
        self.update(persist, |queue| {
            if queue.peek() != Some(sent) {
                return Err(ClientError::SentMessageNotAtFront);
            }
            queue.dequeue_and_refill(cover_factory)?;
            Ok(())
        })
    }

    pub fn fill_level(&self, secret: &PrivateSendingQueueSecret) -> Result<usize> {
        let queue = self.queue.read().map_err(|_| ClientError::LockPoisoned)?;
        Ok(queue.fill_level(secret))
    }

    pub fn peek(&self) -> Result<Option<EncryptedUserToCoverNodeMessage>> {
        let queue = self.queue.read().map_err(|_| ClientError::LockPoisoned)?;
        Ok(queue.peek().cloned())
    }

    fn update<T>(
        &self,
        persist: impl FnOnce(&PrivateSendingQueue) -> std::result::Result<(), StoreError>,
        op: impl FnOnce(&mut PrivateSendingQueue) -> Result<T>,
    ) -> Result<T> {
        let mut live = self.queue.write().map_err(|_| ClientError::LockPoisoned)?;

        let mut next = live.clone();
        let output = op(&mut next)?;
        next.check_invariants()?;
        persist(&next)?;

        *live = next;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sourcebox_shared::constants::USER_TO_COVERNODE_ENCRYPTED_MESSAGE_LEN;
    use sourcebox_shared::error::QueueError;
    use sourcebox_shared::test_utils::TestKeyHierarchy;
    use sourcebox_shared::{create_message, CoverNodeCoverMessageFactory, SourceboxError};
    use sourcebox_shared::keys::{EncryptionKeyPair, User};

    struct Setup {
        handle: SendingQueueHandle,
        factory: CoverNodeCoverMessageFactory,
        secret: PrivateSendingQueueSecret,
        message: EncryptedUserToCoverNodeMessage,
    }

    fn setup(slots: usize) -> Setup {
        let fixture = TestKeyHierarchy::new(Utc::now());
        let keys = fixture.verified_public_keys();
        let factory = CoverNodeCoverMessageFactory::new(&keys, fixture.now);
        let queue =
            PrivateSendingQueue::new(slots, USER_TO_COVERNODE_ENCRYPTED_MESSAGE_LEN, &factory).unwrap();
        let user = EncryptionKeyPair::<User>::generate();
        let profile = keys.journalist_profile(&fixture.journalists[0].identity).unwrap();
        let message = create_message("hi", profile, &keys, user.public_key(), fixture.now).unwrap();

        Setup {
            handle: SendingQueueHandle::new(queue),
            factory,
            secret: PrivateSendingQueueSecret::generate(),
            message,
        }
    }

    #[test]
    fn test_enqueue_then_dequeue() {
        let s = setup(4);

        s.handle.enqueue(&s.secret, s.message.clone(), |_| Ok(())).unwrap();
        assert_eq!(s.handle.fill_level(&s.secret).unwrap(), 1);
        assert_eq!(s.handle.peek().unwrap().unwrap(), s.message);

        s.handle.dequeue_and_refill(&s.message, &s.factory, |_| Ok(())).unwrap();
        assert_eq!(s.handle.fill_level(&s.secret).unwrap(), 0);
        assert_ne!(s.handle.peek().unwrap().unwrap(), s.message);
    }

    #[test]
    fn test_dequeue_refuses_when_front_changed() {
        let s = setup(4);
        let cover = s.handle.peek().unwrap().unwrap();

        s.handle.enqueue(&s.secret, s.message.clone(), |_| Ok(())).unwrap();

        let mut persisted = false;
        let result = s.handle.dequeue_and_refill(&cover, &s.factory, |_| {
            persisted = true;
            Ok(())
        });
        assert!(matches!(result, Err(ClientError::SentMessageNotAtFront)));
        assert!(!persisted);
        assert_eq!(s.handle.fill_level(&s.secret).unwrap(), 1);
        assert_eq!(s.handle.peek().unwrap().unwrap(), s.message);
    }

    #[test]
    fn test_failed_persist_keeps_previous_queue() {
        let s = setup(4);

        let result = s.handle.enqueue(&s.secret, s.message.clone(), |_| {
            Err(StoreError::InvalidBlobName("simulated".into()))
        });

        assert!(matches!(result, Err(ClientError::Store(_))));
        assert_eq!(s.handle.fill_level(&s.secret).unwrap(), 0);
    }

    #[test]
    fn test_full_queue_is_rejected_without_change() {
        let s = setup(1);

        s.handle.enqueue(&s.secret, s.message.clone(), |_| Ok(())).unwrap();
        let before = s.handle.peek().unwrap();

        let result = s.handle.enqueue(&s.secret, s.message.clone(), |_| Ok(()));
        assert!(matches!(
            result,
            Err(ClientError::Core(SourceboxError::Queue(QueueError::QueueIsFull)))
        ));
        assert_eq!(s.handle.peek().unwrap(), before);
    }

    #[test]
    fn test_persist_sees_the_new_queue() {
        let s = setup(4);
        let mut seen = None;

        s.handle
            .enqueue(&s.secret, s.message.clone(), |queue| {
                seen = Some(queue.fill_level(&s.secret));
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, Some(1));
    }
}
