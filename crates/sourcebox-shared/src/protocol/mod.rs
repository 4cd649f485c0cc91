//! The two-layer onion between user, CoverNode and journalist.

mod cover;
mod messages;

pub use cover::{CoverMessageFactory, CoverNodeCoverMessageFactory};
pub use messages::{
    EncryptedJournalistToUserMessage, EncryptedUserToCoverNodeMessage,
    EncryptedUserToJournalistMessage, JournalistToUserMessage, UserToCoverNodeMessage,
    UserToJournalistMessage,
};

use chrono::{DateTime, Utc};

use crate::api::JournalistProfile;
use crate::constants::COVERNODE_WRAPPING_KEY_COUNT;
use crate::crypto::{AnonymousBox, MultiAnonymousBox};
use crate::error::{CryptoError, ProtocolError};
use crate::hierarchy::VerifiedPublicKeys;
use crate::keys::{CoverNodeMessaging, EncryptionKeyPair, JournalistMessaging, PublicEncryptionKey, User};
use crate::padded_string::PaddedCompressedString;

/// Exactly [`COVERNODE_WRAPPING_KEY_COUNT`] CoverNode keys for the outer
/// layer. Fewer available keys are repeated to keep the ciphertext length
/// fixed; none gives an empty list.
pub(crate) fn covernode_wrapping_keys(
    keys: &VerifiedPublicKeys,
    now: DateTime<Utc>,
) -> Vec<PublicEncryptionKey<CoverNodeMessaging>> {
    keys.latest_covernode_messaging_keys(now)
        .into_iter()
        .cycle()
        .take(COVERNODE_WRAPPING_KEY_COUNT)
        .collect()
}

/// Build a real outbound message for `recipient`.
///
/// The text is padded and sealed to the journalist's newest messaging key
/// together with the user's reply key, tagged for routing, then sealed for
/// the CoverNodes. The result has the same length as a cover message.
pub fn create_message(
    text: &str,
    recipient: &JournalistProfile,
    keys: &VerifiedPublicKeys,
    user_pk: &PublicEncryptionKey<User>,
    now: DateTime<Utc>,
) -> Result<EncryptedUserToCoverNodeMessage, ProtocolError> {
    let journalist_pk = keys
        .latest_journalist_messaging_key(&recipient.id, now)
        .ok_or_else(|| ProtocolError::NoJournalistMessagingKey(recipient.id.to_string()))?;

    let padded = PaddedCompressedString::from_string(text)?;
    let inner = AnonymousBox::encrypt(&journalist_pk, &UserToJournalistMessage::new(*user_pk, padded))?;
    let outer = UserToCoverNodeMessage::new(recipient.id.recipient_tag(), inner);

    Ok(MultiAnonymousBox::encrypt(&covernode_wrapping_keys(keys, now), &outer)?)
}

/// CoverNode side: strip the outer layer.
pub fn open_user_to_covernode_message(
    covernode: &EncryptionKeyPair<CoverNodeMessaging>,
    message: &EncryptedUserToCoverNodeMessage,
) -> Result<UserToCoverNodeMessage, CryptoError> {
    MultiAnonymousBox::decrypt(
        covernode.public_key(),
        covernode.secret_key(),
        message,
        COVERNODE_WRAPPING_KEY_COUNT,
    )
}

/// Journalist side: open the inner layer forwarded by the CoverNode.
pub fn open_user_to_journalist_message(
    journalist: &EncryptionKeyPair<JournalistMessaging>,
    message: &EncryptedUserToJournalistMessage,
) -> Result<UserToJournalistMessage, CryptoError> {
    AnonymousBox::decrypt(journalist.public_key(), journalist.secret_key(), message)
}
