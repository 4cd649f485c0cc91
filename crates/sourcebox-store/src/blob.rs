//! Opaque blob persistence.
//!
//! Everything the client keeps on disk goes through a [`BlobStore`]: a flat
//! namespace of named byte strings. Callers seal anything sensitive before
//! it reaches the store.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use directories::ProjectDirs;
use tracing::{debug, info};

use crate::error::{Result, StoreError};

pub trait BlobStore: Send + Sync {
    /// Returns `None` when no blob with that name exists.
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Replaces any previous blob with the same name.
    fn save(&self, name: &str, data: &[u8]) -> Result<()>;

    /// Deleting a missing blob is not an error.
    fn delete(&self, name: &str) -> Result<()>;
}

/// Reject anything that could escape the base directory or collide with
/// the temporary files used for atomic writes.
fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.ends_with(".tmp")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidBlobName(name.to_string()))
    }
}

/// Stores each blob as one file under a base directory.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    base_path: PathBuf,
}

impl FileBlobStore {
    /// Open the store in the platform data directory:
    /// - Linux:   `~/.local/share/sourcebox`
    /// - macOS:   `~/Library/Application Support/com.sourcebox.sourcebox`
    /// - Windows: `{FOLDERID_RoamingAppData}\sourcebox\sourcebox\data`
    pub fn new() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("com", "sourcebox", "sourcebox").ok_or(StoreError::NoDataDir)?;

        Self::open_at(project_dirs.data_dir())
    }

    /// Open (or create) a store rooted at an explicit directory.
    pub fn open_at(base_path: &Path) -> Result<Self> {
        fs::create_dir_all(base_path)?;

        info!(path = %base_path.display(), "Blob store opened");

        Ok(Self {
            base_path: base_path.to_path_buf(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn blob_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.base_path.join(name))
    }
}

impl BlobStore for FileBlobStore {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.blob_path(name)?;

        match fs::read(&path) {
            Ok(data) => {
                debug!(name, size = data.len(), "Loaded blob");
                Ok(Some(data))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = self.blob_path(name)?;
        let tmp_path = self.base_path.join(format!("{name}.tmp"));

        // Readers see either the old or the new blob, never a partial write
        fs::write(&tmp_path, data)?;
        if let Err(e) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        debug!(name, size = data.len(), "Saved blob");
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        let path = self.blob_path(name)?;

        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(name, "Deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.blobs.read().map_err(|_| StoreError::LockPoisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl BlobStore for MemoryBlobStore {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>> {
        validate_name(name)?;
        let blobs = self.blobs.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(blobs.get(name).cloned())
    }

    fn save(&self, name: &str, data: &[u8]) -> Result<()> {
        validate_name(name)?;
        let mut blobs = self.blobs.write().map_err(|_| StoreError::LockPoisoned)?;
        blobs.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let mut blobs = self.blobs.write().map_err(|_| StoreError::LockPoisoned)?;
        blobs.remove(name);
        Ok(())
    }
}
