//! Typed repository with per-key serialized mutation

use super::backend::{Backend, StoreKey};
use super::validate_tenant;
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A per-tenant document persisted as a whole
pub trait Document: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    /// Collection name, used as the first part of the store key
    const COLLECTION: &'static str;

    /// Monotonic write counter
    fn version(&self) -> u64;

    fn set_version(&mut self, version: u64);
}

/// Outcome of a mutation closure
pub enum Mutation<R> {
    /// Persist the modified document and return the value
    Commit(R),
    /// Leave the stored document untouched and return the value
    Discard(R),
}

/// Typed access to one collection of per-tenant documents.
///
/// All mutations for the same tenant run one at a time: a tokio mutex orders
/// tasks of this repository, then the backend lock orders every other
/// repository and process on the same storage. Reads take no lock because
/// backends replace documents atomically.
pub struct Repository<D: Document> {
    backend: Arc<dyn Backend>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    _document: PhantomData<fn() -> D>,
}

impl<D: Document> Repository<D> {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            locks: Mutex::new(HashMap::new()),
            _document: PhantomData,
        }
    }

    /// Load the tenant's document, or an empty one if none was written yet.
    pub async fn load(&self, tenant: &str) -> Result<D> {
        validate_tenant(tenant)?;
        let key = StoreKey::new(D::COLLECTION, tenant);
        self.read_document(&key).await
    }

    /// Run `f` against the tenant's document under the tenant's write lock.
    ///
    /// On [`Mutation::Commit`] the document version is bumped and the whole
    /// document is written back before the lock is released.
    pub async fn mutate<R, F>(&self, tenant: &str, f: F) -> Result<R>
    where
        F: FnOnce(&mut D) -> Mutation<R>,
    {
        validate_tenant(tenant)?;
        let key = StoreKey::new(D::COLLECTION, tenant);
        let lock = self.lock_for(tenant).await;
        let _guard = lock.lock().await;
        let _write_lock = self.backend.lock(&key).await?;

        let mut document = self.read_document(&key).await?;
        let read_version = document.version();

        match f(&mut document) {
            Mutation::Commit(value) => {
                document.set_version(read_version + 1);
                let contents = serde_json::to_string_pretty(&document)?;
                self.backend.write(&key, contents).await?;
                Ok(value)
            }
            Mutation::Discard(value) => Ok(value),
        }
    }

    async fn lock_for(&self, tenant: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(tenant.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn read_document(&self, key: &StoreKey) -> Result<D> {
        match self.backend.read(key).await? {
            Some(contents) => serde_json::from_str(&contents)
                .map_err(|e| Error::Store(format!("document {} is corrupt: {}", key, e))),
            None => Ok(D::default()),
        }
    }
}
