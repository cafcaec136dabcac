//! Per-tenant document storage
//!
//! Every persisted store (incidents, containment, honeyfacts) is a single
//! JSON document per tenant. Writers go through [`Repository::mutate`], which
//! serializes read → mutate → write per `(collection, tenant)` key so that
//! concurrent callers cannot lose each other's updates, including callers in
//! another process sharing the file store.
//!
//! ```text
//! Repository<D> ──Backend::lock(key)──▶ Backend::read ─▶ mutate(&mut D) ─▶ Backend::write
//!                                   │
//!                     ┌─────────────┴─────────────┐
//!               MemoryBackend                FileBackend
//!                                     <base>/<collection>/<tenant>.json
//! ```

pub mod backend;
pub mod repository;

pub use backend::{Backend, FileBackend, MemoryBackend, StoreKey, WriteLock};
pub use repository::{Document, Mutation, Repository};

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{Error, Result};
use std::sync::Arc;

/// Check that a tenant id can safely name a store key.
pub fn validate_tenant(tenant: &str) -> Result<()> {
    if tenant.is_empty() || tenant.len() > 128 {
        return Err(Error::InvalidInput(format!(
            "tenant id must be 1-128 characters, got {:?}",
            tenant
        )));
    }
    if tenant.starts_with('.') {
        return Err(Error::InvalidInput(format!(
            "tenant id must not start with '.': {:?}",
            tenant
        )));
    }
    if !tenant
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(Error::InvalidInput(format!(
            "tenant id contains unsupported characters: {:?}",
            tenant
        )));
    }
    Ok(())
}

/// Build the backend selected by the storage configuration.
pub fn open_backend(config: &StorageConfig) -> Arc<dyn Backend> {
    match config.backend {
        StorageBackend::File => Arc::new(FileBackend::new(config.base_dir.clone())),
        StorageBackend::Memory => Arc::new(MemoryBackend::new()),
    }
}
