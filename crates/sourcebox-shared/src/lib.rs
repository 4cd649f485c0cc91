//! # sourcebox-shared
//!
//! Protocol core for the sourcebox client: the encryption boxes, the signed
//! key hierarchy, the private sending queue and dead drop processing.
//!
//! Every outbound message is a fixed-size `MultiAnonymousBox` that looks the
//! same whether it carries a real message or cover traffic, and every public
//! key is used only after its certificate chain has been checked against a
//! trusted organization root.

pub mod api;
pub mod constants;
pub mod crypto;
pub mod dead_drop;
pub mod encodable;
pub mod error;
pub mod hierarchy;
pub mod keys;
pub mod padded_string;
pub mod protocol;
pub mod queue;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use api::{DeadDropData, JournalistProfile, PublicKeysData};
pub use dead_drop::{
    DeadDropSignatureMode, DecryptedDeadDrops, Message, ReceivedMessage, VerifiedDeadDrops,
};
pub use encodable::Encodable;
pub use error::{Result, SourceboxError};
pub use hierarchy::VerifiedPublicKeys;
pub use padded_string::PaddedCompressedString;
pub use protocol::{create_message, CoverNodeCoverMessageFactory, EncryptedUserToCoverNodeMessage};
pub use queue::{PrivateSendingQueue, PrivateSendingQueueSecret};
pub use types::{JournalistIdentity, RecipientTag};
