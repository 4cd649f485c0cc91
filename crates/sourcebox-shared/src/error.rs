use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceboxError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("Sending queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: invalid ciphertext or wrong key")]
    DecryptionFailed,

    #[error("No wrapped key could be opened or the secret box failed to authenticate")]
    DecryptWithSecretBoxFailed,

    #[error("At least one recipient public key is required")]
    MissingRecipientPublicKeys,

    #[error("Decrypted payload is malformed: {0}")]
    Payload(#[from] EncodingError),
}

#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("Compressed string is {len} bytes, at most {max} fit in the padding")]
    CompressedStringTooLong { len: usize, max: usize },

    #[error("Decompression ratio exceeds the allowed maximum")]
    DecompressionRatioTooHigh,

    #[error("Malformed padded string")]
    InvalidPaddedString,

    #[error("Expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid journalist identity")]
    InvalidJournalistIdentity,

    #[error("Unknown message type tag {0:#04x}")]
    UnknownMessageType(u8),

    #[error("Compression error: {0}")]
    Compression(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid key bytes")]
    InvalidKeyBytes,

    #[error("Invalid signature bytes")]
    InvalidSignatureBytes,

    #[error("Signature verification failed")]
    SignatureVerificationFailed,

    #[error("Key expired at {0}")]
    Expired(DateTime<Utc>),

    #[error("Organization key is not in the trusted root list")]
    UntrustedRoot,

    #[error("Key hierarchy contains no journalists")]
    NoJournalists,

    #[error("No key hierarchy could be verified")]
    NoValidHierarchy,

    #[error("Hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("Timestamp parse error: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueueError {
    #[error("Sending queue is full")]
    QueueIsFull,

    #[error("Message or hint does not have the fixed slot size")]
    MessageOrHintSizeIncorrect,

    #[error("Serialized queue buffer has the wrong size")]
    DeserializationBufferSizeIncorrect,

    #[error("Sending queue must have at least one slot")]
    EmptyQueue,

    #[error("Sending queue invariant violated")]
    InvariantViolated,

    #[error("Failed to generate a cover message")]
    CoverMessageGeneration,
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("No verified messaging key for journalist {0}")]
    NoJournalistMessagingKey(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),
}

pub type Result<T> = std::result::Result<T, SourceboxError>;
