use crate::constants::{
    JOURNALIST_TO_USER_MESSAGE_LEN, RECIPIENT_TAG_LEN,
    USER_TO_COVERNODE_MESSAGE_LEN, USER_TO_JOURNALIST_ENCRYPTED_MESSAGE_LEN,
    USER_TO_JOURNALIST_MESSAGE_LEN, X25519_PUBLIC_KEY_LEN,
};
use crate::crypto::{fill_random, AnonymousBox, MultiAnonymousBox, TwoPartyBox};
use crate::encodable::{fixed_bytes, Encodable};
use crate::error::{CryptoError, EncodingError};
use crate::keys::{JournalistMessaging, PublicEncryptionKey, SecretEncryptionKey, User};
use crate::padded_string::PaddedCompressedString;
use crate::types::{JournalistIdentity, RecipientTag};

pub type EncryptedUserToJournalistMessage = AnonymousBox<UserToJournalistMessage>;
pub type EncryptedUserToCoverNodeMessage = MultiAnonymousBox<UserToCoverNodeMessage>;
pub type EncryptedJournalistToUserMessage = TwoPartyBox<JournalistToUserMessage>;

/// Inner layer, readable only by the journalist: the key to reply to and the
/// padded text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserToJournalistMessage {
    reply_key: PublicEncryptionKey<User>,
    message: PaddedCompressedString,
}

impl UserToJournalistMessage {
    pub fn new(reply_key: PublicEncryptionKey<User>, message: PaddedCompressedString) -> Self {
        Self { reply_key, message }
    }

    pub fn reply_key(&self) -> &PublicEncryptionKey<User> {
        &self.reply_key
    }

    pub fn message(&self) -> &PaddedCompressedString {
        &self.message
    }
}

impl Encodable for UserToJournalistMessage {
    fn as_unencrypted_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(USER_TO_JOURNALIST_MESSAGE_LEN);
        bytes.extend_from_slice(self.reply_key.as_bytes());
        bytes.extend_from_slice(self.message.as_bytes());
        bytes
    }

    fn from_unencrypted_bytes(bytes: &[u8]) -> Result<Self, EncodingError> {
        if bytes.len() != USER_TO_JOURNALIST_MESSAGE_LEN {
            return Err(EncodingError::InvalidLength {
                expected: USER_TO_JOURNALIST_MESSAGE_LEN,
                actual: bytes.len(),
            });
        }

        let (reply_key, message) = bytes.split_at(X25519_PUBLIC_KEY_LEN);
        Ok(Self {
            reply_key: PublicEncryptionKey::from_bytes(fixed_bytes(reply_key)?),
            message: PaddedCompressedString::from_unencrypted_bytes(message)?,
        })
    }
}

/// Outer layer, readable by the CoverNode: where to route the inner
/// ciphertext. Cover messages carry the all-zero tag and random bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserToCoverNodeMessage {
    recipient_tag: RecipientTag,
    payload: EncryptedUserToJournalistMessage,
}

impl UserToCoverNodeMessage {
    pub fn new(recipient_tag: RecipientTag, payload: EncryptedUserToJournalistMessage) -> Self {
        Self {
            recipient_tag,
            payload,
        }
    }

    pub fn new_cover() -> Self {
        let mut payload = vec![0u8; USER_TO_JOURNALIST_ENCRYPTED_MESSAGE_LEN];
        fill_random(&mut payload);
        Self {
            recipient_tag: RecipientTag::COVER,
            payload: AnonymousBox::from_vec_unchecked(payload),
        }
    }

    pub fn recipient_tag(&self) -> RecipientTag {
        self.recipient_tag
    }

    pub fn is_cover(&self) -> bool {
        self.recipient_tag.is_cover()
    }

    pub fn payload(&self) -> &EncryptedUserToJournalistMessage {
        &self.payload
    }

    pub fn into_payload(self) -> EncryptedUserToJournalistMessage {
        self.payload
    }
}

impl Encodable for UserToCoverNodeMessage {
    fn as_unencrypted_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(USER_TO_COVERNODE_MESSAGE_LEN);
        bytes.extend_from_slice(&self.recipient_tag.0);
        bytes.extend_from_slice(self.payload.as_bytes());
        bytes
    }

    fn from_unencrypted_bytes(bytes: &[u8]) -> Result<Self, EncodingError> {
        if bytes.len() != USER_TO_COVERNODE_MESSAGE_LEN {
            return Err(EncodingError::InvalidLength {
                expected: USER_TO_COVERNODE_MESSAGE_LEN,
                actual: bytes.len(),
            });
        }

        let (tag, payload) = bytes.split_at(RECIPIENT_TAG_LEN);
        Ok(Self {
            recipient_tag: RecipientTag(fixed_bytes(tag)?),
            payload: AnonymousBox::from_vec_unchecked(payload.to_vec()),
        })
    }
}

const MESSAGE_TYPE_TEXT: u8 = 0x00;
const MESSAGE_TYPE_HANDOVER: u8 = 0x01;

/// Reply from a journalist, published in a dead drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalistToUserMessage {
    Message(PaddedCompressedString),
    /// The conversation continues with another journalist or desk
    HandOver(JournalistIdentity),
}

impl JournalistToUserMessage {
    pub fn new_with_string(text: &str) -> Result<Self, EncodingError> {
        Ok(Self::Message(PaddedCompressedString::from_string(text)?))
    }

    /// Journalist side: seal for the user's reply key.
    pub fn encrypt(
        &self,
        user_pk: &PublicEncryptionKey<User>,
        journalist_sk: &SecretEncryptionKey<JournalistMessaging>,
    ) -> Result<EncryptedJournalistToUserMessage, CryptoError> {
        TwoPartyBox::encrypt(user_pk, journalist_sk, self)
    }
}

impl Encodable for JournalistToUserMessage {
    fn as_unencrypted_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(JOURNALIST_TO_USER_MESSAGE_LEN);
        match self {
            Self::Message(message) => {
                bytes.push(MESSAGE_TYPE_TEXT);
                bytes.extend_from_slice(message.as_bytes());
            }
            Self::HandOver(journalist_id) => {
                // Zero-terminated, zero-padded to the fixed payload length
                bytes.push(MESSAGE_TYPE_HANDOVER);
                bytes.extend_from_slice(journalist_id.as_str().as_bytes());
                bytes.resize(JOURNALIST_TO_USER_MESSAGE_LEN, 0);
            }
        }
        bytes
    }

    fn from_unencrypted_bytes(bytes: &[u8]) -> Result<Self, EncodingError> {
        if bytes.len() != JOURNALIST_TO_USER_MESSAGE_LEN {
            return Err(EncodingError::InvalidLength {
                expected: JOURNALIST_TO_USER_MESSAGE_LEN,
                actual: bytes.len(),
            });
        }

        let (tag, payload) = (bytes[0], &bytes[1..]);
        match tag {
            MESSAGE_TYPE_TEXT => Ok(Self::Message(PaddedCompressedString::from_unencrypted_bytes(payload)?)),
            MESSAGE_TYPE_HANDOVER => {
                let end = payload
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(EncodingError::InvalidJournalistIdentity)?;
                let id = std::str::from_utf8(&payload[..end])
                    .map_err(|_| EncodingError::InvalidJournalistIdentity)?;
                Ok(Self::HandOver(JournalistIdentity::new(id)?))
            }
            other => Err(EncodingError::UnknownMessageType(other)),
        }
    }
}
