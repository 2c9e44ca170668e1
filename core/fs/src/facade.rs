//! Unified file operations over local paths and `cloud://` URIs.
//!
//! Every call decides once, from the path alone, whether it targets the
//! local filesystem or a cloud provider. Cloud calls fetch the provider's
//! settings fresh from the registry, resolve the adapter for its type and
//! stage bytes through a scratch file that is removed on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use stowage_common::{is_cloud_path, CloudUri, Error, FileEntry, ProviderKind, Result};
use stowage_storage::{
    AdapterRegistry, ConnectionHealth, ProviderDescriptor, ProviderRegistry, ScratchFile,
    StorageAdapter,
};

use crate::local;
use crate::migration::{MigrationConfig, MigrationEngine, MigrationReport};

/// Where a path points.
enum Location {
    Local(PathBuf),
    Cloud(CloudUri),
}

impl Location {
    fn of(path: &str) -> Result<Self> {
        if is_cloud_path(path) {
            CloudUri::parse(path)
                .map(Location::Cloud)
                .ok_or_else(|| Error::InvalidUri(path.to_string()))
        } else if path.starts_with(stowage_common::CLOUD_SCHEME) {
            Err(Error::InvalidUri(path.to_string()))
        } else {
            Ok(Location::Local(PathBuf::from(path)))
        }
    }
}

/// Storage façade.
pub struct Storage {
    providers: Arc<dyn ProviderRegistry>,
    adapters: Arc<AdapterRegistry>,
    scratch_dir: PathBuf,
    migration: MigrationConfig,
}

impl Storage {
    /// Create a façade.
    pub fn new(
        providers: Arc<dyn ProviderRegistry>,
        adapters: Arc<AdapterRegistry>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            providers,
            adapters,
            scratch_dir: scratch_dir.into(),
            migration: MigrationConfig::default(),
        }
    }

    /// Replace the migration settings.
    pub fn with_migration_config(mut self, config: MigrationConfig) -> Self {
        self.migration = config;
        self
    }

    /// Directory holding scratch files.
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Whether `path` is a cloud address.
    pub fn is_cloud_path(path: &str) -> bool {
        is_cloud_path(path)
    }

    /// Resolve the provider a key names: a provider type selects the default
    /// provider of that type, anything else is a provider id.
    async fn provider(&self, key: &str) -> Result<(ProviderDescriptor, Arc<dyn StorageAdapter>)> {
        let descriptor = match key.parse::<ProviderKind>() {
            Ok(kind) => self.providers.get_default_by_type(kind).await?,
            Err(_) => self.providers.get_by_id(key).await?,
        };
        let adapter = self.adapters.resolve(descriptor.kind)?;
        debug!(key, provider = %descriptor.id, adapter = adapter.name(), "Resolved provider");
        Ok((descriptor, adapter))
    }

    /// Read a whole file.
    ///
    /// # Errors
    /// - Invalid cloud URI or unconfigured provider
    /// - File missing or unreadable
    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        match Location::of(path)? {
            Location::Local(local_path) => local::read(&local_path).await,
            Location::Cloud(uri) => {
                let (descriptor, adapter) = self.provider(uri.provider_key()).await?;
                let scratch = ScratchFile::reserve(&self.scratch_dir, "download", "bin").await?;
                adapter
                    .download_file(
                        &descriptor.credentials,
                        &descriptor.config,
                        uri.path(),
                        scratch.path(),
                    )
                    .await?;
                let data = tokio::fs::read(scratch.path()).await?;
                debug!(uri = %uri, bytes = data.len(), "Read cloud file");
                Ok(data)
            }
        }
    }

    /// Write a whole file, replacing any existing content.
    ///
    /// # Errors
    /// - Invalid cloud URI or unconfigured provider
    /// - Backend or local I/O failure
    pub async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        match Location::of(path)? {
            Location::Local(local_path) => local::write(&local_path, data).await,
            Location::Cloud(uri) => {
                let (descriptor, adapter) = self.provider(uri.provider_key()).await?;
                let scratch = ScratchFile::reserve(&self.scratch_dir, "upload", "bin").await?;
                scratch.write_private(data).await?;
                adapter
                    .upload_file(
                        &descriptor.credentials,
                        &descriptor.config,
                        scratch.path(),
                        uri.path(),
                    )
                    .await?;
                debug!(uri = %uri, bytes = data.len(), "Wrote cloud file");
                Ok(())
            }
        }
    }

    /// Check whether a file exists. Never fails: errors are logged and
    /// reported as `false`.
    pub async fn file_exists(&self, path: &str) -> bool {
        let result = match Location::of(path) {
            Ok(Location::Local(local_path)) => local::exists(&local_path).await,
            Ok(Location::Cloud(uri)) => match self.provider(uri.provider_key()).await {
                Ok((descriptor, adapter)) => {
                    adapter
                        .file_exists(&descriptor.credentials, &descriptor.config, uri.path())
                        .await
                }
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };
        result.unwrap_or_else(|err| {
            debug!(path, error = %err, "Existence check failed");
            false
        })
    }

    /// List the direct children of a directory.
    ///
    /// Cloud entries come back folders first, with paths rewritten to
    /// fully-qualified `cloud://` URIs.
    pub async fn list_files(&self, path: &str) -> Result<Vec<FileEntry>> {
        match Location::of(path)? {
            Location::Local(local_path) => local::list(&local_path).await,
            Location::Cloud(uri) => {
                let (descriptor, adapter) = self.provider(uri.provider_key()).await?;
                let listing = adapter
                    .list_contents(&descriptor.credentials, &descriptor.config, uri.path())
                    .await?;
                Ok(listing
                    .into_entries()
                    .into_iter()
                    .map(|mut entry| {
                        entry.path = CloudUri::build(uri.provider_key(), &entry.path);
                        entry
                    })
                    .collect())
            }
        }
    }

    /// Copy a file by reading it fully and writing it to the destination.
    ///
    /// Works across any combination of local and cloud paths.
    pub async fn copy_file(&self, source: &str, destination: &str) -> Result<()> {
        let data = self.read_file(source).await?;
        self.write_file(destination, &data).await?;
        info!(source, destination, bytes = data.len(), "Copied file");
        Ok(())
    }

    /// Delete a file. Returns `false` instead of failing; the error is logged.
    pub async fn delete_file(&self, path: &str) -> bool {
        let result = match Location::of(path) {
            Ok(Location::Local(local_path)) => local::delete(&local_path).await,
            Ok(Location::Cloud(uri)) => match self.provider(uri.provider_key()).await {
                Ok((descriptor, adapter)) => {
                    adapter
                        .delete_file(&descriptor.credentials, &descriptor.config, uri.path())
                        .await
                }
                Err(err) => Err(err),
            },
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => {
                info!(path, "Deleted file");
                true
            }
            Err(err) => {
                warn!(path, error = %err, "Delete failed");
                false
            }
        }
    }

    /// Upload a local directory tree to the default provider of `kind`.
    pub async fn migrate_to_cloud(
        &self,
        local_dir: &Path,
        kind: ProviderKind,
        cloud_base_path: &str,
    ) -> Result<MigrationReport> {
        MigrationEngine::new(
            self.providers.clone(),
            self.adapters.clone(),
            self.migration.clone(),
        )
        .migrate(local_dir, kind, cloud_base_path)
        .await
    }

    /// Probe a provider, named by type or id.
    pub async fn test_connection(&self, provider_key: &str) -> Result<ConnectionHealth> {
        let (descriptor, adapter) = self.provider(provider_key).await?;
        adapter
            .test_connection(&descriptor.credentials, &descriptor.config)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use stowage_storage::{
        Credentials, Listing, MemoryAdapter, MemoryProviderRegistry, ProviderConfig,
        ProviderRecord,
    };
    use tempfile::TempDir;

    /// Adapter whose uploads always fail after the scratch file is written.
    struct RejectingAdapter;

    #[async_trait]
    impl StorageAdapter for RejectingAdapter {
        fn name(&self) -> &str {
            "rejecting"
        }

        async fn download_file(
            &self,
            _credentials: &Credentials,
            _config: &ProviderConfig,
            remote_path: &str,
            local_path: &Path,
        ) -> Result<()> {
            tokio::fs::write(local_path, b"partial").await?;
            Err(Error::Backend(format!("transfer of {} aborted", remote_path)))
        }

        async fn upload_file(
            &self,
            _credentials: &Credentials,
            _config: &ProviderConfig,
            local_path: &Path,
            _remote_path: &str,
        ) -> Result<()> {
            assert!(local_path.exists());
            Err(Error::Network("connection reset".to_string()))
        }

        async fn list_contents(
            &self,
            _credentials: &Credentials,
            _config: &ProviderConfig,
            _remote_path: &str,
        ) -> Result<Listing> {
            Err(Error::Network("connection reset".to_string()))
        }

        async fn file_exists(
            &self,
            _credentials: &Credentials,
            _config: &ProviderConfig,
            _remote_path: &str,
        ) -> Result<bool> {
            Err(Error::Authentication("expired token".to_string()))
        }

        async fn delete_file(
            &self,
            _credentials: &Credentials,
            _config: &ProviderConfig,
            _remote_path: &str,
        ) -> Result<()> {
            Err(Error::Backend("locked".to_string()))
        }

        async fn test_connection(
            &self,
            _credentials: &Credentials,
            _config: &ProviderConfig,
        ) -> Result<ConnectionHealth> {
            Err(Error::Network("unreachable".to_string()))
        }
    }

    struct Fixture {
        storage: Storage,
        s3: MemoryAdapter,
        azure: MemoryAdapter,
        scratch: TempDir,
        local: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_sftp(Arc::new(RejectingAdapter))
        }

        fn with_sftp(sftp: Arc<dyn StorageAdapter>) -> Self {
            let providers = MemoryProviderRegistry::with_records(vec![
                ProviderRecord::new(
                    "reports-bucket",
                    ProviderKind::S3,
                    "Reports",
                    json!({"bucket": "reports"}),
                    json!("{\"access_key_id\": \"AKIA\", \"secret_access_key\": \"s\"}"),
                )
                .as_default(),
                ProviderRecord::new(
                    "archive",
                    ProviderKind::Azure,
                    "Archive",
                    json!({"container": "archive"}),
                    json!(null),
                ),
                ProviderRecord::new(
                    "dropbox",
                    ProviderKind::Sftp,
                    "Drop box",
                    json!({"host": "sftp.example.com"}),
                    json!(null),
                ),
            ]);

            let s3 = MemoryAdapter::for_kind(ProviderKind::S3);
            let azure = MemoryAdapter::for_kind(ProviderKind::Azure);
            let mut adapters = AdapterRegistry::new();
            adapters.register(ProviderKind::S3, Arc::new(s3.clone())).unwrap();
            adapters.register(ProviderKind::Azure, Arc::new(azure.clone())).unwrap();
            adapters.register(ProviderKind::Sftp, sftp).unwrap();

            let scratch = TempDir::new().unwrap();
            let storage = Storage::new(Arc::new(providers), Arc::new(adapters), scratch.path());
            Self {
                storage,
                s3,
                azure,
                scratch,
                local: TempDir::new().unwrap(),
            }
        }

        fn local_path(&self, name: &str) -> String {
            self.local.path().join(name).to_string_lossy().into_owned()
        }

        fn scratch_is_empty(&self) -> bool {
            std::fs::read_dir(self.scratch.path()).unwrap().count() == 0
        }
    }

    #[tokio::test]
    async fn test_cloud_write_then_read() {
        let fx = Fixture::new();
        let csv = b"id,total\n1,9.50\n".to_vec();

        fx.storage.write_file("cloud://s3/reports/out.csv", &csv).await.unwrap();

        assert_eq!(fx.s3.get("reports/out.csv"), Some(csv.clone()));
        assert_eq!(fx.storage.read_file("cloud://s3/reports/out.csv").await.unwrap(), csv);
        assert!(fx.storage.file_exists("cloud://s3/reports/out.csv").await);
        assert!(fx.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_provider_id_addressing() {
        let fx = Fixture::new();
        fx.storage.write_file("cloud://archive/old/a.txt", b"x").await.unwrap();
        assert_eq!(fx.azure.get("old/a.txt"), Some(b"x".to_vec()));

        fx.storage
            .write_file("cloud://reports-bucket/b.txt", b"y")
            .await
            .unwrap();
        assert_eq!(fx.s3.get("b.txt"), Some(b"y".to_vec()));
    }

    #[tokio::test]
    async fn test_local_write_creates_parent() {
        let fx = Fixture::new();
        let path = fx.local_path("nested/dir/file.txt");

        fx.storage.write_file(&path, b"local").await.unwrap();
        assert_eq!(fx.storage.read_file(&path).await.unwrap(), b"local");
        assert!(fx.storage.file_exists(&path).await);
    }

    #[tokio::test]
    async fn test_file_exists_never_fails() {
        let fx = Fixture::new();
        assert!(!fx.storage.file_exists("cloud://gcp/anything").await);
        assert!(!fx.storage.file_exists("cloud://no-such-id/anything").await);
        assert!(!fx.storage.file_exists("cloud:///missing-key").await);
        assert!(!fx.storage.file_exists("cloud://sftp/in/a.csv").await);
        assert!(!fx.storage.file_exists("cloud://s3/missing.txt").await);
        assert!(!fx.storage.file_exists(&fx.local_path("missing.txt")).await);
    }

    #[tokio::test]
    async fn test_unconfigured_provider_read_fails() {
        let fx = Fixture::new();
        let result = fx.storage.read_file("cloud://minio/a.txt").await;
        assert!(matches!(result, Err(Error::ProviderNotConfigured(_))));

        let result = fx.storage.read_file("cloud://").await;
        assert!(matches!(result, Err(Error::InvalidUri(_))));
    }

    #[tokio::test]
    async fn test_list_files_rewrites_paths() {
        let fx = Fixture::new();
        fx.s3.insert("in/a.csv", b"1".to_vec());
        fx.s3.insert("in/old/b.csv", b"2".to_vec());

        let entries = fx.storage.list_files("cloud://s3/in").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_directory);
        assert_eq!(entries[0].path, "cloud://s3/in/old");
        assert_eq!(entries[1].path, "cloud://s3/in/a.csv");
    }

    #[tokio::test]
    async fn test_list_local_directory() {
        let fx = Fixture::new();
        fx.storage.write_file(&fx.local_path("a.txt"), b"abc").await.unwrap();

        let entries = fx
            .storage
            .list_files(&fx.local.path().to_string_lossy())
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].size, 3);
    }

    #[tokio::test]
    async fn test_copy_across_backends() {
        let fx = Fixture::new();
        let source = fx.local_path("source.bin");
        fx.storage.write_file(&source, b"payload").await.unwrap();

        // local -> cloud
        fx.storage.copy_file(&source, "cloud://s3/copies/a.bin").await.unwrap();
        // cloud -> other cloud
        fx.storage
            .copy_file("cloud://s3/copies/a.bin", "cloud://azure/copies/b.bin")
            .await
            .unwrap();
        // same backend
        fx.storage
            .copy_file("cloud://s3/copies/a.bin", "cloud://s3/copies/c.bin")
            .await
            .unwrap();
        // cloud -> local
        let back = fx.local_path("back/source.bin");
        fx.storage.copy_file("cloud://azure/copies/b.bin", &back).await.unwrap();

        assert_eq!(fx.s3.get("copies/c.bin"), Some(b"payload".to_vec()));
        assert_eq!(fx.storage.read_file(&back).await.unwrap(), b"payload");
        assert!(fx.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_copy_missing_source_writes_nothing() {
        let fx = Fixture::new();
        let result = fx
            .storage
            .copy_file("cloud://s3/missing.bin", "cloud://azure/x.bin")
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert!(fx.azure.is_empty());
    }

    #[tokio::test]
    async fn test_scratch_removed_on_upload_failure() {
        let fx = Fixture::new();
        let result = fx.storage.write_file("cloud://sftp/in/a.csv", b"data").await;

        assert!(matches!(result, Err(Error::Network(_))));
        assert!(fx.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_scratch_removed_on_download_failure() {
        let fx = Fixture::new();
        let result = fx.storage.read_file("cloud://dropbox/in/a.csv").await;

        assert!(matches!(result, Err(Error::Backend(_))));
        assert!(fx.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_delete_reports_bool() {
        let fx = Fixture::new();
        fx.s3.insert("a.txt", b"x".to_vec());

        assert!(fx.storage.delete_file("cloud://s3/a.txt").await);
        assert!(!fx.storage.delete_file("cloud://s3/a.txt").await);
        assert!(!fx.storage.delete_file("cloud://sftp/in/a.csv").await);
        assert!(!fx.storage.delete_file("cloud://gcp/a.txt").await);

        let local = fx.local_path("l.txt");
        fx.storage.write_file(&local, b"x").await.unwrap();
        assert!(fx.storage.delete_file(&local).await);
        assert!(!fx.storage.file_exists(&local).await);
    }

    #[tokio::test]
    async fn test_migrate_to_cloud() {
        let fx = Fixture::new();
        fx.storage.write_file(&fx.local_path("tree/a.csv"), b"a").await.unwrap();
        fx.storage.write_file(&fx.local_path("tree/sub/b.csv"), b"b").await.unwrap();

        let report = fx
            .storage
            .migrate_to_cloud(&fx.local.path().join("tree"), ProviderKind::Azure, "imported")
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.files_uploaded, 2);
        assert_eq!(fx.azure.keys(), vec!["imported/a.csv", "imported/sub/b.csv"]);
    }

    #[tokio::test]
    async fn test_test_connection() {
        let fx = Fixture::new();
        let health = fx.storage.test_connection("s3").await.unwrap();
        assert_eq!(health.provider, ProviderKind::S3);

        let result = fx.storage.test_connection("dropbox").await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[test]
    fn test_is_cloud_path() {
        assert!(Storage::is_cloud_path("cloud://s3/a"));
        assert!(!Storage::is_cloud_path("/tmp/a"));
        assert!(!Storage::is_cloud_path("s3://bucket/a"));
    }
}
