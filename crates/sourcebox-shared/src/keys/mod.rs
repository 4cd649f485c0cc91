pub mod certificate;
pub mod encryption;
pub mod roles;
pub mod signing;

pub use certificate::{
    certificate_data, SelfSignedPublicSigningKey, SignedPublicEncryptionKey, SignedPublicSigningKey,
    VerifiedSigningKey,
};
pub use encryption::{EncryptionKeyPair, PublicEncryptionKey, SecretEncryptionKey};
pub use roles::{
    ChildRole, CoverNodeId, CoverNodeMessaging, CoverNodeProvisioning, JournalistId,
    JournalistMessaging, JournalistProvisioning, Organization, Role, TrustedOrganization, User,
};
pub use signing::{PublicSigningKey, Signature, SigningKeyPair};
