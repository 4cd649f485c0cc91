//! Private sending queue.
//!
//! A fixed number of fixed-size slots, always full. Real messages sit at the
//! front, cover messages fill the rest, and each slot carries a hint. Only a
//! holder of the queue secret can tell which hints are HMACs of their slot
//! and therefore how many real messages are waiting; to anyone else every
//! slot looks like cover.

use std::collections::VecDeque;

use hmac::digest::{Key, KeyInit};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;
use zeroize::Zeroize;

use crate::constants::HINT_HMAC_LEN;
use crate::crypto::{random_bytes, MultiAnonymousBox};
use crate::error::QueueError;
use crate::protocol::{CoverMessageFactory, EncryptedUserToCoverNodeMessage};

type HmacSha256 = Hmac<Sha256>;

const SERIALIZED_HEADER_LEN: usize = 8;

/// Secret that marks which queue slots hold real messages.
#[derive(Clone, Serialize, Deserialize)]
pub struct PrivateSendingQueueSecret([u8; 32]);

impl PrivateSendingQueueSecret {
    pub fn generate() -> Self {
        Self(random_bytes())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Drop for PrivateSendingQueueSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for PrivateSendingQueueSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateSendingQueueSecret(..)")
    }
}

/// Per-slot hint: HMAC of the ciphertext for real messages, random bytes for
/// cover. Compared in constant time only.
#[derive(Clone, Copy)]
pub struct HintHmac([u8; HINT_HMAC_LEN]);

impl HintHmac {
    pub fn new(secret: &PrivateSendingQueueSecret, message: &[u8]) -> Self {
        // Zero-padding to the block size is what HMAC does with a short key anyway
        let mut key = Key::<HmacSha256>::default();
        key[..secret.as_bytes().len()].copy_from_slice(secret.as_bytes());
        let mut mac = <HmacSha256 as KeyInit>::new(&key);
        key.as_mut_slice().zeroize();
        mac.update(message);
        Self(mac.finalize().into_bytes().into())
    }

    pub fn random() -> Self {
        Self(random_bytes())
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, QueueError> {
        bytes
            .try_into()
            .map(Self)
            .map_err(|_| QueueError::MessageOrHintSizeIncorrect)
    }

    pub fn as_bytes(&self) -> &[u8; HINT_HMAC_LEN] {
        &self.0
    }
}

impl ConstantTimeEq for HintHmac {
    fn ct_eq(&self, other: &Self) -> subtle::Choice {
        self.0.ct_eq(&other.0)
    }
}

impl std::fmt::Debug for HintHmac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HintHmac({})", hex::encode(self.0))
    }
}

#[derive(Debug, Clone)]
pub struct PrivateSendingQueue {
    total_queue_size: usize,
    message_size: usize,
    storage: VecDeque<EncryptedUserToCoverNodeMessage>,
    hints: VecDeque<HintHmac>,
}

impl PrivateSendingQueue {
    /// A queue of `total_queue_size` cover messages, each with a random hint.
    pub fn new(
        total_queue_size: usize,
        message_size: usize,
        cover_factory: &dyn CoverMessageFactory,
    ) -> Result<Self, QueueError> {
        if total_queue_size == 0 {
            return Err(QueueError::EmptyQueue);
        }

        let mut queue = Self {
            total_queue_size,
            message_size,
            storage: VecDeque::with_capacity(total_queue_size),
            hints: VecDeque::with_capacity(total_queue_size),
        };
        for _ in 0..total_queue_size {
            let cover = queue.create_cover(cover_factory)?;
            queue.storage.push_back(cover);
            queue.hints.push_back(HintHmac::random());
        }

        queue.check_invariants()?;
        Ok(queue)
    }

    pub fn total_queue_size(&self) -> usize {
        self.total_queue_size
    }

    pub fn message_size(&self) -> usize {
        self.message_size
    }

    /// Number of real messages at the front of the queue, as seen by the
    /// holder of `secret`.
    pub fn fill_level(&self, secret: &PrivateSendingQueueSecret) -> usize {
        self.storage
            .iter()
            .zip(self.hints.iter())
            .take_while(|(message, hint)| bool::from(HintHmac::new(secret, message.as_bytes()).ct_eq(hint)))
            .count()
    }

    /// Insert a real message after the ones already queued, displacing the
    /// last cover message.
    pub fn enqueue(
        &mut self,
        secret: &PrivateSendingQueueSecret,
        message: EncryptedUserToCoverNodeMessage,
    ) -> Result<(), QueueError> {
        if message.len() != self.message_size {
            return Err(QueueError::MessageOrHintSizeIncorrect);
        }

        let fill_level = self.fill_level(secret);
        if fill_level >= self.total_queue_size {
            return Err(QueueError::QueueIsFull);
        }

        let hint = HintHmac::new(secret, message.as_bytes());
        self.storage.insert(fill_level, message);
        self.hints.insert(fill_level, hint);
        self.storage.pop_back();
        self.hints.pop_back();

        self.check_invariants()
    }

    /// Remove the front message for sending and append a fresh cover message.
    pub fn dequeue_and_refill(
        &mut self,
        cover_factory: &dyn CoverMessageFactory,
    ) -> Result<EncryptedUserToCoverNodeMessage, QueueError> {
        let cover = self.create_cover(cover_factory)?;

        let front = self.storage.pop_front().ok_or(QueueError::InvariantViolated)?;
        self.hints.pop_front();
        self.storage.push_back(cover);
        self.hints.push_back(HintHmac::random());

        self.check_invariants()?;
        Ok(front)
    }

    pub fn peek(&self) -> Option<&EncryptedUserToCoverNodeMessage> {
        self.storage.front()
    }

    /// `u32 BE count || u32 BE message size || messages || hints`
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(
            SERIALIZED_HEADER_LEN + self.total_queue_size * (self.message_size + HINT_HMAC_LEN),
        );
        bytes.extend_from_slice(&(self.total_queue_size as u32).to_be_bytes());
        bytes.extend_from_slice(&(self.message_size as u32).to_be_bytes());
        for message in &self.storage {
            bytes.extend_from_slice(message.as_bytes());
        }
        for hint in &self.hints {
            bytes.extend_from_slice(hint.as_bytes());
        }
        bytes
    }

    pub fn deserialize(bytes: &[u8], expected_message_size: usize) -> Result<Self, QueueError> {
        let header = bytes
            .get(..SERIALIZED_HEADER_LEN)
            .ok_or(QueueError::DeserializationBufferSizeIncorrect)?;
        let (count, message_size) = header.split_at(4);
        let count = u32::from_be_bytes(
            count
                .try_into()
                .map_err(|_| QueueError::DeserializationBufferSizeIncorrect)?,
        ) as usize;
        let message_size = u32::from_be_bytes(
            message_size
                .try_into()
                .map_err(|_| QueueError::DeserializationBufferSizeIncorrect)?,
        ) as usize;

        if message_size != expected_message_size {
            return Err(QueueError::MessageOrHintSizeIncorrect);
        }
        if count == 0 {
            return Err(QueueError::EmptyQueue);
        }

        let messages_len = count
            .checked_mul(message_size)
            .ok_or(QueueError::DeserializationBufferSizeIncorrect)?;
        let expected_len = count
            .checked_mul(HINT_HMAC_LEN)
            .and_then(|hints_len| hints_len.checked_add(messages_len))
            .and_then(|body_len| body_len.checked_add(SERIALIZED_HEADER_LEN))
            .ok_or(QueueError::DeserializationBufferSizeIncorrect)?;
        if bytes.len() != expected_len {
            return Err(QueueError::DeserializationBufferSizeIncorrect);
        }

        let (messages, hints) = bytes[SERIALIZED_HEADER_LEN..].split_at(messages_len);
        let storage = messages
            .chunks_exact(message_size)
            .map(|chunk| MultiAnonymousBox::from_vec_unchecked(chunk.to_vec()))
            .collect();
        let hints = hints
            .chunks_exact(HINT_HMAC_LEN)
            .map(HintHmac::from_slice)
            .collect::<Result<_, _>>()?;

        let queue = Self {
            total_queue_size: count,
            message_size,
            storage,
            hints,
        };
        queue.check_invariants()?;
        Ok(queue)
    }

    pub fn check_invariants(&self) -> Result<(), QueueError> {
        let sizes_ok = self.storage.len() == self.total_queue_size
            && self.hints.len() == self.total_queue_size
            && self.storage.iter().all(|message| message.len() == self.message_size);
        if !sizes_ok {
            warn!(
                slots = self.storage.len(),
                hints = self.hints.len(),
                expected = self.total_queue_size,
                "Sending queue invariant violated"
            );
            return Err(QueueError::InvariantViolated);
        }
        Ok(())
    }

    fn create_cover(
        &self,
        cover_factory: &dyn CoverMessageFactory,
    ) -> Result<EncryptedUserToCoverNodeMessage, QueueError> {
        let cover = cover_factory.create_cover_message().map_err(|error| {
            warn!(%error, "Cover message generation failed");
            QueueError::CoverMessageGeneration
        })?;
        if cover.len() != self.message_size {
            return Err(QueueError::MessageOrHintSizeIncorrect);
        }
        Ok(cover)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::error::CryptoError;

    const TEST_MESSAGE_SIZE: usize = 64;

    struct RandomCoverFactory;

    impl CoverMessageFactory for RandomCoverFactory {
        fn create_cover_message(&self) -> Result<EncryptedUserToCoverNodeMessage, CryptoError> {
            Ok(MultiAnonymousBox::from_vec_unchecked(random_bytes::<TEST_MESSAGE_SIZE>().to_vec()))
        }
    }

    fn real_message(marker: u8) -> EncryptedUserToCoverNodeMessage {
        MultiAnonymousBox::from_vec_unchecked(vec![marker; TEST_MESSAGE_SIZE])
    }

    fn new_queue(size: usize) -> PrivateSendingQueue {
        PrivateSendingQueue::new(size, TEST_MESSAGE_SIZE, &RandomCoverFactory).unwrap()
    }

    #[test]
    fn test_new_queue_is_all_cover() {
        let queue = new_queue(8);
        let secret = PrivateSendingQueueSecret::generate();
        assert_eq!(queue.fill_level(&secret), 0);
        assert!(queue.check_invariants().is_ok());
    }

    #[test]
    fn test_zero_size_rejected() {
        let result = PrivateSendingQueue::new(0, TEST_MESSAGE_SIZE, &RandomCoverFactory);
        assert_eq!(result.unwrap_err(), QueueError::EmptyQueue);
    }

    #[test]
    fn test_fifo_then_cover() {
        let mut queue = new_queue(8);
        let secret = PrivateSendingQueueSecret::generate();

        for marker in 1..=3 {
            queue.enqueue(&secret, real_message(marker)).unwrap();
        }
        assert_eq!(queue.fill_level(&secret), 3);

        for marker in 1..=3 {
            let sent = queue.dequeue_and_refill(&RandomCoverFactory).unwrap();
            assert_eq!(sent.as_bytes(), &[marker; TEST_MESSAGE_SIZE]);
        }
        assert_eq!(queue.fill_level(&secret), 0);

        // Once the real messages are gone only cover comes out
        for _ in 0..8 {
            let cover = queue.dequeue_and_refill(&RandomCoverFactory).unwrap();
            assert_eq!(cover.len(), TEST_MESSAGE_SIZE);
            for marker in 1..=3 {
                assert_ne!(cover, real_message(marker));
            }
        }
    }

    #[test]
    fn test_capacity_enforced() {
        let mut queue = new_queue(4);
        let secret = PrivateSendingQueueSecret::generate();
        for marker in 0..4 {
            queue.enqueue(&secret, real_message(marker)).unwrap();
        }
        assert_eq!(queue.fill_level(&secret), 4);
        assert_eq!(queue.enqueue(&secret, real_message(9)), Err(QueueError::QueueIsFull));
        assert!(queue.check_invariants().is_ok());
    }

    #[test]
    fn test_wrong_message_size_rejected() {
        let mut queue = new_queue(4);
        let secret = PrivateSendingQueueSecret::generate();
        let short = MultiAnonymousBox::from_vec_unchecked(vec![0u8; TEST_MESSAGE_SIZE - 1]);
        assert_eq!(queue.enqueue(&secret, short), Err(QueueError::MessageOrHintSizeIncorrect));
        assert_eq!(queue.fill_level(&secret), 0);
    }

    #[test]
    fn test_other_secret_sees_nothing() {
        let mut queue = new_queue(8);
        let secret = PrivateSendingQueueSecret::generate();
        let other = PrivateSendingQueueSecret::generate();

        queue.enqueue(&secret, real_message(1)).unwrap();
        queue.enqueue(&secret, real_message(2)).unwrap();
        assert_eq!(queue.fill_level(&other), 0);

        // Enqueueing under another secret lands at the front and hides ours
        queue.enqueue(&other, real_message(3)).unwrap();
        assert_eq!(queue.fill_level(&other), 1);
        assert_eq!(queue.peek().map(|m| m.as_bytes()[0]), Some(3));
        assert_eq!(queue.fill_level(&secret), 0);
    }

    #[test]
    fn test_serialize_roundtrip_keeps_fill_level() {
        let mut queue = new_queue(8);
        let secret = PrivateSendingQueueSecret::generate();
        queue.enqueue(&secret, real_message(5)).unwrap();

        let bytes = queue.serialize();
        assert_eq!(bytes.len(), 8 + 8 * (TEST_MESSAGE_SIZE + HINT_HMAC_LEN));

        let restored = PrivateSendingQueue::deserialize(&bytes, TEST_MESSAGE_SIZE).unwrap();
        assert_eq!(restored.fill_level(&secret), 1);
        assert_eq!(restored.serialize(), bytes);
    }

    #[test]
    fn test_deserialize_rejects_bad_buffers() {
        let bytes = new_queue(4).serialize();

        assert_eq!(
            PrivateSendingQueue::deserialize(&bytes[..bytes.len() - 1], TEST_MESSAGE_SIZE).unwrap_err(),
            QueueError::DeserializationBufferSizeIncorrect
        );

        let mut extra = bytes.clone();
        extra.push(0);
        assert_eq!(
            PrivateSendingQueue::deserialize(&extra, TEST_MESSAGE_SIZE).unwrap_err(),
            QueueError::DeserializationBufferSizeIncorrect
        );

        assert_eq!(
            PrivateSendingQueue::deserialize(&bytes, TEST_MESSAGE_SIZE + 1).unwrap_err(),
            QueueError::MessageOrHintSizeIncorrect
        );

        assert_eq!(
            PrivateSendingQueue::deserialize(&bytes[..5], TEST_MESSAGE_SIZE).unwrap_err(),
            QueueError::DeserializationBufferSizeIncorrect
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Enqueue(u8),
        Dequeue,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![any::<u8>().prop_map(Op::Enqueue), Just(Op::Dequeue)]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_shape_and_order_hold_under_any_ops(ops in proptest::collection::vec(op(), 0..40)) {
            let size = 6;
            let mut queue = new_queue(size);
            let secret = PrivateSendingQueueSecret::generate();
            let mut expected: VecDeque<u8> = VecDeque::new();
            let mut enqueued: Vec<u8> = Vec::new();

            for op in ops {
                match op {
                    Op::Enqueue(marker) => {
                        let result = queue.enqueue(&secret, real_message(marker));
                        if expected.len() == size {
                            prop_assert_eq!(result, Err(QueueError::QueueIsFull));
                        } else {
                            prop_assert!(result.is_ok());
                            expected.push_back(marker);
                            enqueued.push(marker);
                        }
                    }
                    Op::Dequeue => {
                        let sent = queue.dequeue_and_refill(&RandomCoverFactory).unwrap();
                        match expected.pop_front() {
                            Some(marker) => prop_assert_eq!(sent.as_bytes(), &[marker; TEST_MESSAGE_SIZE][..]),
                            None => {
                                for marker in &enqueued {
                                    prop_assert_ne!(sent.as_bytes(), &[*marker; TEST_MESSAGE_SIZE][..]);
                                }
                            }
                        }
                    }
                }

                prop_assert!(queue.check_invariants().is_ok());
                prop_assert_eq!(queue.fill_level(&secret), expected.len());
            }
        }
    }
}
