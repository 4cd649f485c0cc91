//! Wire-level constants shared with the CoverNode and journalist implementations.
//!
//! These values are part of the protocol. Changing any of them breaks
//! interoperability with the server side.

/// XChaCha20-Poly1305 nonce size in bytes
pub const NONCE_SIZE: usize = 24;

/// Poly1305 authentication tag size in bytes
pub const MAC_SIZE: usize = 16;

/// X25519 public key size in bytes
pub const X25519_PUBLIC_KEY_LEN: usize = 32;

/// Ed25519 public key size in bytes
pub const ED25519_PUBLIC_KEY_LEN: usize = 32;

/// Ed25519 signature size in bytes
pub const SIGNATURE_LEN: usize = 64;

/// Symmetric key size in bytes (for XChaCha20-Poly1305)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Sealed box overhead: MAC plus the trailing ephemeral public key
pub const ANONYMOUS_BOX_OVERHEAD: usize = MAC_SIZE + X25519_PUBLIC_KEY_LEN;

/// Authenticated box overhead: MAC plus the trailing nonce
pub const TWO_PARTY_BOX_OVERHEAD: usize = MAC_SIZE + NONCE_SIZE;

/// One symmetric key wrapped in an anonymous box
pub const MULTI_ANONYMOUS_BOX_WRAPPED_KEY_LEN: usize = SYMMETRIC_KEY_SIZE + ANONYMOUS_BOX_OVERHEAD;

/// Length of the journalist recipient tag carried in user to CoverNode messages
pub const RECIPIENT_TAG_LEN: usize = 4;

/// Recipient tag marking a cover message
pub const RECIPIENT_TAG_FOR_COVER: [u8; RECIPIENT_TAG_LEN] = [0u8; RECIPIENT_TAG_LEN];

/// Fixed length of a padded, compressed text payload
pub const MESSAGE_PADDING_LEN: usize = 256;

/// Size of the big-endian compressed length header inside a padded payload
pub const PADDED_STRING_HEADER_LEN: usize = 2;

/// Compressed text larger than this ratio on decompression is rejected
pub const MAX_DECOMPRESSION_RATIO: usize = 100;

/// Plaintext user to journalist message: reply key followed by the padded text
pub const USER_TO_JOURNALIST_MESSAGE_LEN: usize = X25519_PUBLIC_KEY_LEN + MESSAGE_PADDING_LEN;

/// Encrypted user to journalist message (336 bytes)
pub const USER_TO_JOURNALIST_ENCRYPTED_MESSAGE_LEN: usize =
    USER_TO_JOURNALIST_MESSAGE_LEN + ANONYMOUS_BOX_OVERHEAD;

/// Plaintext user to CoverNode message: recipient tag followed by the inner ciphertext
pub const USER_TO_COVERNODE_MESSAGE_LEN: usize =
    RECIPIENT_TAG_LEN + USER_TO_JOURNALIST_ENCRYPTED_MESSAGE_LEN;

/// Number of CoverNode messaging keys every outbound message is wrapped for
pub const COVERNODE_WRAPPING_KEY_COUNT: usize = 2;

/// Encrypted user to CoverNode message (516 bytes)
pub const USER_TO_COVERNODE_ENCRYPTED_MESSAGE_LEN: usize = COVERNODE_WRAPPING_KEY_COUNT
    * MULTI_ANONYMOUS_BOX_WRAPPED_KEY_LEN
    + USER_TO_COVERNODE_MESSAGE_LEN
    + MAC_SIZE;

/// Plaintext journalist to user message: type tag followed by the payload
pub const JOURNALIST_TO_USER_MESSAGE_LEN: usize = 1 + MESSAGE_PADDING_LEN;

/// Encrypted journalist to user message, the dead drop chunk size (297 bytes)
pub const JOURNALIST_TO_USER_ENCRYPTED_MESSAGE_LEN: usize =
    JOURNALIST_TO_USER_MESSAGE_LEN + TWO_PARTY_BOX_OVERHEAD;

/// Longest journalist identity accepted in a handover message
pub const MAX_JOURNALIST_IDENTITY_LEN: usize = 128;

/// HMAC-SHA256 hint length
pub const HINT_HMAC_LEN: usize = 32;

/// Number of slots in the private sending queue
pub const PRIVATE_SENDING_QUEUE_SIZE: usize = 64;

/// Dead drops claiming a publish date further ahead than this are dropped
pub const MAX_DEAD_DROP_FUTURE_SKEW_DAYS: i64 = 7;

/// Key derivation contexts (BLAKE3)
pub const KDF_CONTEXT_ANONYMOUS_BOX_KEY: &str = "sourcebox anonymous-box key v1";
pub const KDF_CONTEXT_ANONYMOUS_BOX_NONCE: &str = "sourcebox anonymous-box nonce v1";
pub const KDF_CONTEXT_TWO_PARTY_BOX_KEY: &str = "sourcebox two-party-box key v1";
