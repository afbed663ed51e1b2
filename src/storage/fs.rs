//! Filesystem-backed `Storage`, rooted at `STORAGE_ROOT_FOLDER` (spec
//! section 6). Each category is a subdirectory; keys are sanitized to a
//! single path segment since pointers and hashes may contain characters
//! that are awkward on some filesystems.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use super::{Category, Storage};
use crate::error::StorageError;

#[derive(Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, category: &Category, key: &str) -> PathBuf {
        self.root.join(category.namespace()).join(sanitize(key))
    }
}

/// Percent-encodes path separators and NUL bytes so a key can never
/// escape its category directory.
fn sanitize(key: &str) -> String {
    key.replace('%', "%25")
        .replace('/', "%2F")
        .replace('\\', "%5C")
        .replace('\0', "%00")
}

/// Inverse of [`sanitize`], for turning directory entries back into keys.
fn unsanitize(name: &str) -> String {
    name.replace("%2F", "/")
        .replace("%5C", "\\")
        .replace("%00", "\0")
        .replace("%25", "%")
}

async fn ensure_parent(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[async_trait]
impl Storage for FsStorage {
    async fn exists(&self, category: &Category, key: &str) -> Result<bool, StorageError> {
        Ok(tokio::fs::try_exists(self.path_for(category, key)).await?)
    }

    async fn get(&self, category: &Category, key: &str) -> Result<Option<Bytes>, StorageError> {
        match tokio::fs::read(self.path_for(category, key)).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, category: &Category, key: &str, value: Bytes) -> Result<(), StorageError> {
        let path = self.path_for(category, key);
        ensure_parent(&path).await?;
        tokio::fs::write(path, value).await?;
        Ok(())
    }

    async fn delete(&self, category: &Category, key: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.path_for(category, key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, category: &Category) -> Result<Vec<String>, StorageError> {
        let dir = self.root.join(category.namespace());
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                keys.push(unsanitize(name));
            }
        }
        Ok(keys)
    }
}
