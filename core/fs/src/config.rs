//! Façade configuration and wiring.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use stowage_common::Result;
use stowage_storage::{
    create_default_registry, BridgeTimeouts, ListingCache, NoopListingCache, ProviderRegistry,
    SftpAdapter, TtlListingCache, WorkerBridge, WorkerCommand,
};

use crate::facade::Storage;
use crate::migration::MigrationConfig;

fn default_listing_cache_ttl_secs() -> u64 {
    60
}

/// Settings for a [`Storage`] instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Scratch directory for staged transfers and worker payloads.
    /// Defaults to `<temp>/stowage`.
    pub scratch_dir: Option<PathBuf>,
    /// Listing cache lifetime; 0 disables the cache.
    #[serde(default = "default_listing_cache_ttl_secs")]
    pub listing_cache_ttl_secs: u64,
    /// SFTP worker program.
    pub sftp_worker: WorkerCommand,
    /// Worker deadlines.
    pub bridge_timeouts: BridgeTimeouts,
    /// Migration tuning.
    pub migration: MigrationConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            scratch_dir: None,
            listing_cache_ttl_secs: default_listing_cache_ttl_secs(),
            sftp_worker: WorkerCommand::default(),
            bridge_timeouts: BridgeTimeouts::default(),
            migration: MigrationConfig::default(),
        }
    }
}

impl StorageConfig {
    /// Effective scratch directory.
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("stowage"))
    }

    /// Listing cache to inject into the SFTP adapter.
    pub fn listing_cache(&self) -> Arc<dyn ListingCache> {
        if self.listing_cache_ttl_secs == 0 {
            Arc::new(NoopListingCache)
        } else {
            Arc::new(TtlListingCache::new(Duration::from_secs(
                self.listing_cache_ttl_secs,
            )))
        }
    }

    /// Wire the cache, worker bridge, adapters and façade.
    ///
    /// # Errors
    /// - Scratch directory cannot be created
    pub fn build(&self, providers: Arc<dyn ProviderRegistry>) -> Result<Storage> {
        let scratch_dir = self.scratch_dir();
        std::fs::create_dir_all(&scratch_dir)?;

        let bridge = WorkerBridge::new(self.sftp_worker.clone(), scratch_dir.join("worker"))
            .with_timeouts(self.bridge_timeouts);
        let sftp = SftpAdapter::new(bridge, self.listing_cache());
        let adapters = Arc::new(create_default_registry(sftp));

        debug!(
            scratch_dir = %scratch_dir.display(),
            worker = %self.sftp_worker.program,
            listing_cache_ttl_secs = self.listing_cache_ttl_secs,
            "Built storage façade"
        );

        Ok(Storage::new(providers, adapters, scratch_dir)
            .with_migration_config(self.migration.clone()))
    }
}
