//! # sourcebox-store
//!
//! Local persistence for the sourcebox client.
//!
//! Storage is a flat namespace of opaque blobs behind the [`BlobStore`]
//! trait. The user state and the sending queue are sealed with
//! XChaCha20-Poly1305 under a caller-supplied [`StorageKey`] before they
//! reach the store, so a backend only ever sees ciphertext.

pub mod blob;
pub mod key;
pub mod state;

mod error;

pub use blob::{BlobStore, FileBlobStore, MemoryBlobStore};
pub use error::{Result, StoreError};
pub use key::StorageKey;
pub use state::{load_sending_queue, save_sending_queue, UserState};
