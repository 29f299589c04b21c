//! services/api/src/adapters/storage.rs
//!
//! Local-disk implementation of the `AttachmentStorage` port.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use rand::distributions::{Alphanumeric, DistString};
use speakfree_core::domain::StoredFile;
use speakfree_core::ports::{AttachmentStorage, PortError, PortResult};
use speakfree_core::uploads::extension_of;
use tracing::{debug, warn};

/// Writes evidence files under a single directory.
///
/// Stored names are `<millis>-<random><ext>`; nothing from the uploaded name besides the
/// extension reaches the filesystem. The storage ref is that bare file name.
#[derive(Clone, Debug)]
pub struct LocalDiskStorage {
    root: PathBuf,
}

impl LocalDiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the upload directory if it does not exist yet.
    pub async fn ensure_root(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stored_name(original_name: &str) -> String {
        let suffix = Alphanumeric
            .sample_string(&mut rand::thread_rng(), 8)
            .to_ascii_lowercase();
        let extension = extension_of(original_name)
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        format!("{}-{}{}", Utc::now().timestamp_millis(), suffix, extension)
    }

    /// Resolves a storage ref to a path, refusing anything that is not a bare file name.
    fn path_for(&self, storage_ref: &str) -> PortResult<PathBuf> {
        let name = Path::new(storage_ref);
        let is_bare = name.file_name().map(|f| f == name.as_os_str()).unwrap_or(false);
        if storage_ref.is_empty() || !is_bare || storage_ref.starts_with('.') {
            return Err(PortError::Invalid(format!(
                "'{}' is not a storage ref",
                storage_ref
            )));
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl AttachmentStorage for LocalDiskStorage {
    async fn store(&self, original_name: &str, data: &[u8]) -> PortResult<StoredFile> {
        let storage_ref = Self::stored_name(original_name);
        let path = self.root.join(&storage_ref);

        tokio::fs::write(&path, data).await.map_err(|e| {
            PortError::Unexpected(format!("Failed to write {}: {}", path.display(), e))
        })?;

        debug!(storage_ref = %storage_ref, size = data.len(), "Stored attachment");
        Ok(StoredFile {
            storage_ref,
            size_bytes: data.len() as u64,
        })
    }

    async fn remove(&self, storage_ref: &str) -> PortResult<()> {
        let path = self.path_for(storage_ref)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(storage_ref = %storage_ref, "Failed to remove attachment: {}", e);
                Err(PortError::Unexpected(e.to_string()))
            }
        }
    }
}
