//! Adapter registry for dispatching on provider type.

use std::collections::HashMap;
use std::sync::Arc;

use stowage_common::{Error, ProviderKind, Result};

use crate::adapter::StorageAdapter;
use crate::object_store::ObjectStoreAdapter;
use crate::sftp::SftpAdapter;

/// Registry mapping each provider type to one adapter instance.
///
/// Adapter selection happens once per operation through [`resolve`];
/// nothing below the adapter re-dispatches on type.
///
/// [`resolve`]: AdapterRegistry::resolve
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn StorageAdapter>>,
}

impl AdapterRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the adapter serving `kind`.
    ///
    /// # Preconditions
    /// - `kind` must not be registered yet
    ///
    /// # Errors
    /// - Returns error if `kind` is already registered
    pub fn register(&mut self, kind: ProviderKind, adapter: Arc<dyn StorageAdapter>) -> Result<()> {
        if self.adapters.contains_key(&kind) {
            return Err(Error::AlreadyExists(format!(
                "Adapter for '{}' is already registered",
                kind
            )));
        }
        self.adapters.insert(kind, adapter);
        Ok(())
    }

    /// Resolve the adapter for a provider type.
    ///
    /// # Errors
    /// - No adapter registered for `kind`
    pub fn resolve(&self, kind: ProviderKind) -> Result<Arc<dyn StorageAdapter>> {
        self.adapters.get(&kind).cloned().ok_or_else(|| {
            Error::InvalidInput(format!("Unsupported provider type: {}", kind))
        })
    }

    /// Registered provider types.
    pub fn kinds(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|k| self.adapters.contains_key(k))
            .collect()
    }

    /// Check if an adapter is registered for `kind`.
    pub fn has_adapter(&self, kind: ProviderKind) -> bool {
        self.adapters.contains_key(&kind)
    }
}

/// Create a registry with the production adapters.
///
/// The SFTP adapter carries the worker bridge and listing cache, so it is
/// built by the caller.
pub fn create_default_registry(sftp: SftpAdapter) -> AdapterRegistry {
    let adapters: [(ProviderKind, Arc<dyn StorageAdapter>); 5] = [
        (ProviderKind::S3, Arc::new(ObjectStoreAdapter::s3())),
        (ProviderKind::Minio, Arc::new(ObjectStoreAdapter::minio())),
        (ProviderKind::Azure, Arc::new(ObjectStoreAdapter::azure())),
        (ProviderKind::Gcp, Arc::new(ObjectStoreAdapter::gcs())),
        (ProviderKind::Sftp, Arc::new(sftp)),
    ];
    AdapterRegistry {
        adapters: adapters.into_iter().collect(),
    }
}
