use chrono::{DateTime, Utc};

use super::messages::{EncryptedUserToCoverNodeMessage, UserToCoverNodeMessage};
use super::covernode_wrapping_keys;
use crate::crypto::MultiAnonymousBox;
use crate::error::CryptoError;
use crate::hierarchy::VerifiedPublicKeys;
use crate::keys::{CoverNodeMessaging, PublicEncryptionKey};

/// Source of cover traffic for the sending queue.
pub trait CoverMessageFactory: Send + Sync {
    fn create_cover_message(&self) -> Result<EncryptedUserToCoverNodeMessage, CryptoError>;
}

/// Cover messages indistinguishable from real ones: an all-zero recipient
/// tag and random inner bytes, sealed for the same CoverNode keys a real
/// message would use.
#[derive(Debug, Clone)]
pub struct CoverNodeCoverMessageFactory {
    covernode_msg_pks: Vec<PublicEncryptionKey<CoverNodeMessaging>>,
}

impl CoverNodeCoverMessageFactory {
    pub fn new(keys: &VerifiedPublicKeys, now: DateTime<Utc>) -> Self {
        Self {
            covernode_msg_pks: covernode_wrapping_keys(keys, now),
        }
    }
}

impl CoverMessageFactory for CoverNodeCoverMessageFactory {
    fn create_cover_message(&self) -> Result<EncryptedUserToCoverNodeMessage, CryptoError> {
        MultiAnonymousBox::encrypt(&self.covernode_msg_pks, &UserToCoverNodeMessage::new_cover())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{COVERNODE_WRAPPING_KEY_COUNT, USER_TO_COVERNODE_ENCRYPTED_MESSAGE_LEN};
    use crate::test_utils::TestKeyHierarchy;

    #[test]
    fn test_cover_message_opens_as_cover() {
        let fixture = TestKeyHierarchy::new(Utc::now());
        let factory = CoverNodeCoverMessageFactory::new(&fixture.verified_public_keys(), fixture.now);

        let cover = factory.create_cover_message().unwrap();
        assert_eq!(cover.len(), USER_TO_COVERNODE_ENCRYPTED_MESSAGE_LEN);

        let covernode = &fixture.covernodes[0].messaging;
        let opened = MultiAnonymousBox::decrypt(
            covernode.public_key(),
            covernode.secret_key(),
            &cover,
            COVERNODE_WRAPPING_KEY_COUNT,
        )
        .unwrap();
        assert!(opened.is_cover());
    }

    #[test]
    fn test_without_covernode_keys_fails() {
        let fixture = TestKeyHierarchy::new(Utc::now());
        let factory = CoverNodeCoverMessageFactory::new(
            &fixture.verified_public_keys(),
            fixture.now + chrono::Duration::days(365),
        );
        assert!(matches!(
            factory.create_cover_message(),
            Err(CryptoError::MissingRecipientPublicKeys)
        ));
    }
}
