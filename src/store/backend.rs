//! Raw document backends
//!
//! A backend moves whole documents in and out and hands out the
//! cross-process write lock for a key; typing and versioning live in
//! [`super::Repository`].

use crate::error::{Error, Result};
use async_trait::async_trait;
use fs2::FileExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Address of one per-tenant document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    pub collection: &'static str,
    pub tenant: String,
}

impl StoreKey {
    pub fn new(collection: &'static str, tenant: impl Into<String>) -> Self {
        Self {
            collection,
            tenant: tenant.into(),
        }
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.tenant)
    }
}

/// Exclusive hold on one store key, released on drop
pub struct WriteLock {
    _file: Option<std::fs::File>,
}

impl WriteLock {
    /// A lock with nothing behind it, for backends private to one process
    pub fn unlocked() -> Self {
        Self { _file: None }
    }
}

/// Whole-document storage.
///
/// `write` must be all-or-nothing: a reader never observes a partially
/// written document.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Read a document, `None` if it has never been written.
    async fn read(&self, key: &StoreKey) -> Result<Option<String>>;

    /// Replace a document.
    async fn write(&self, key: &StoreKey, contents: String) -> Result<()>;

    /// Take the write lock shared by every process using this storage.
    ///
    /// Held across a whole read → mutate → write cycle.
    async fn lock(&self, _key: &StoreKey) -> Result<WriteLock> {
        Ok(WriteLock::unlocked())
    }
}

/// Backend holding documents in process memory
pub struct MemoryBackend {
    documents: RwLock<HashMap<StoreKey, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn read(&self, key: &StoreKey) -> Result<Option<String>> {
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn write(&self, key: &StoreKey, contents: String) -> Result<()> {
        self.documents.write().await.insert(key.clone(), contents);
        Ok(())
    }
}

/// Backend storing one JSON file per document
///
/// Directory layout:
/// ```text
/// <base_dir>/
/// ├── incidents/
/// │   ├── <tenant>.json
/// │   └── <tenant>.json.lock
/// ├── containment/
/// │   └── <tenant>.json
/// └── honeyfacts/
///     └── <tenant>.json
/// ```
///
/// Writers on the same base directory, in this process or another, take an
/// advisory lock on `<tenant>.json.lock` before touching the document.
pub struct FileBackend {
    base_dir: PathBuf,
}

impl FileBackend {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, key: &StoreKey) -> PathBuf {
        self.base_dir
            .join(key.collection)
            .join(format!("{}.json", key.tenant))
    }
}

#[async_trait]
impl Backend for FileBackend {
    async fn read(&self, key: &StoreKey) -> Result<Option<String>> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Store(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn write(&self, key: &StoreKey, contents: String) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to a sibling temp file, then rename over the target.
        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
        if let Err(e) = tokio::fs::write(&tmp, contents).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::Store(format!(
                "failed to write {}: {}",
                tmp.display(),
                e
            )));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::Store(format!(
                "failed to replace {}: {}",
                path.display(),
                e
            )));
        }
        tracing::trace!(key = %key, "Document written");
        Ok(())
    }

    async fn lock(&self, key: &StoreKey) -> Result<WriteLock> {
        let path = self.path_for(key).with_extension("json.lock");
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<std::fs::File> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(|e| Error::Internal(format!("lock task for {} failed: {}", key, e)))?
        .map_err(|e| Error::Store(format!("failed to lock {}: {}", key, e)))?;

        tracing::trace!(key = %key, "Write lock taken");
        Ok(WriteLock { _file: Some(file) })
    }
}
