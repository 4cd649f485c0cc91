//! Client configuration loaded from environment variables.
//!
//! Every setting has a default, so a session can be opened with no
//! environment at all.

use std::path::PathBuf;

use sourcebox_shared::DeadDropSignatureMode;
use sourcebox_store::{FileBlobStore, StoreError};

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Directory holding the sealed client state.
    /// Env: `SOURCEBOX_DATA_DIR`
    /// Default: the platform data directory.
    pub data_dir: Option<PathBuf>,

    /// File with one hex-encoded trusted organization key per line.
    /// Env: `SOURCEBOX_TRUSTED_ROOTS`
    pub trusted_roots_path: Option<PathBuf>,

    /// Public keys JSON document to inspect.
    /// Env: `SOURCEBOX_PUBLIC_KEYS`
    pub public_keys_path: Option<PathBuf>,

    /// Dead drops JSON document to inspect.
    /// Env: `SOURCEBOX_DEAD_DROPS`
    pub dead_drops_path: Option<PathBuf>,

    /// Which dead drop signatures are accepted.
    /// Env: `SOURCEBOX_REQUIRE_TIMESTAMPED_DEAD_DROPS` (true/false)
    /// Default: `false`, legacy signatures are still accepted.
    pub dead_drop_signature_mode: DeadDropSignatureMode,
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        let path = |name: &str| lookup(name).filter(|v| !v.trim().is_empty()).map(PathBuf::from);

        config.data_dir = path("SOURCEBOX_DATA_DIR");
        config.trusted_roots_path = path("SOURCEBOX_TRUSTED_ROOTS");
        config.public_keys_path = path("SOURCEBOX_PUBLIC_KEYS");
        config.dead_drops_path = path("SOURCEBOX_DEAD_DROPS");

        if let Some(val) = lookup("SOURCEBOX_REQUIRE_TIMESTAMPED_DEAD_DROPS") {
            match parse_bool(&val) {
                Some(true) => config.dead_drop_signature_mode = DeadDropSignatureMode::TimestampedOnly,
                Some(false) => config.dead_drop_signature_mode = DeadDropSignatureMode::Compatible,
                None => {
                    tracing::warn!(
                        value = %val,
                        "Invalid SOURCEBOX_REQUIRE_TIMESTAMPED_DEAD_DROPS, using default"
                    );
                }
            }
        }

        config
    }

    /// Open the file store in `data_dir`, or in the platform data directory.
    pub fn open_blob_store(&self) -> Result<FileBlobStore, StoreError> {
        match &self.data_dir {
            Some(dir) => FileBlobStore::open_at(dir),
            None => FileBlobStore::new(),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
