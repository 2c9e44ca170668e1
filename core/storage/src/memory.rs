//! In-memory storage adapter for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use stowage_common::{Error, FileEntry, ProviderKind, Result};

use crate::adapter::{ConnectionHealth, Listing, StorageAdapter};
use crate::providers::{Credentials, ProviderConfig};

/// Stored object.
#[derive(Debug, Clone)]
struct Object {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

/// In-memory object store.
///
/// Useful for testing and development. Keys form a flat namespace like the
/// object-store adapters: folders are synthesized from key prefixes. All
/// data is lost on drop. Clones share the same store.
#[derive(Debug, Clone)]
pub struct MemoryAdapter {
    kind: ProviderKind,
    objects: Arc<RwLock<BTreeMap<String, Object>>>,
}

impl MemoryAdapter {
    /// Create an empty store answering as an S3 provider.
    pub fn new() -> Self {
        Self::for_kind(ProviderKind::S3)
    }

    /// Create an empty store answering as `kind`.
    pub fn for_kind(kind: ProviderKind) -> Self {
        Self {
            kind,
            objects: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    fn key(path: &str) -> String {
        path.trim_matches('/').to_string()
    }

    /// Store an object directly.
    pub fn insert(&self, path: &str, data: impl Into<Vec<u8>>) {
        let object = Object {
            data: data.into(),
            modified: Utc::now(),
        };
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(Self::key(path), object);
    }

    /// Fetch an object directly.
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&Self::key(path))
            .map(|o| o.data.clone())
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    fn name(&self) -> &str {
        "memory"
    }

    async fn download_file(
        &self,
        _credentials: &Credentials,
        _config: &ProviderConfig,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<()> {
        let data = self
            .get(remote_path)
            .ok_or_else(|| Error::NotFound(format!("Object not found: {}", remote_path)))?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, data).await?;
        Ok(())
    }

    async fn upload_file(
        &self,
        _credentials: &Credentials,
        _config: &ProviderConfig,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<()> {
        if Self::key(remote_path).is_empty() {
            return Err(Error::InvalidInput(format!(
                "Not an object key: '{}'",
                remote_path
            )));
        }
        let data = tokio::fs::read(local_path).await?;
        self.insert(remote_path, data);
        Ok(())
    }

    async fn list_contents(
        &self,
        _credentials: &Credentials,
        _config: &ProviderConfig,
        remote_path: &str,
    ) -> Result<Listing> {
        let dir = Self::key(remote_path);
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };

        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        let mut listing = Listing::default();
        let mut folders = BTreeSet::new();

        for (key, object) in objects.range(prefix.clone()..) {
            let Some(relative) = key.strip_prefix(&prefix) else {
                break;
            };
            match relative.split_once('/') {
                // Direct child object
                None => listing.files.push(FileEntry::file(
                    relative,
                    key.as_str(),
                    object.data.len() as u64,
                    object.modified,
                )),
                Some((folder, _)) => {
                    if folders.insert(folder.to_string()) {
                        listing.folders.push(FileEntry::directory(
                            folder,
                            format!("{}{}", prefix, folder),
                            object.modified,
                        ));
                    }
                }
            }
        }

        Ok(listing)
    }

    async fn file_exists(
        &self,
        _credentials: &Credentials,
        _config: &ProviderConfig,
        remote_path: &str,
    ) -> Result<bool> {
        Ok(self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&Self::key(remote_path)))
    }

    async fn delete_file(
        &self,
        _credentials: &Credentials,
        _config: &ProviderConfig,
        remote_path: &str,
    ) -> Result<()> {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&Self::key(remote_path))
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Object not found: {}", remote_path)))
    }

    async fn test_connection(
        &self,
        _credentials: &Credentials,
        _config: &ProviderConfig,
    ) -> Result<ConnectionHealth> {
        Ok(ConnectionHealth {
            provider: self.kind,
            latency_ms: 0,
            detail: format!("in-memory store with {} objects", self.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_settings() -> (Credentials, ProviderConfig) {
        (Credentials::default(), ProviderConfig::default())
    }

    #[tokio::test]
    async fn test_upload_download() {
        let temp = TempDir::new().unwrap();
        let (creds, config) = no_settings();
        let adapter = MemoryAdapter::new();
        let source = temp.path().join("in.txt");
        let target = temp.path().join("out/copy.txt");
        std::fs::write(&source, b"Hello, World!").unwrap();

        adapter
            .upload_file(&creds, &config, &source, "/docs/hello.txt")
            .await
            .unwrap();
        adapter
            .download_file(&creds, &config, "docs/hello.txt", &target)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"Hello, World!");
    }

    #[tokio::test]
    async fn test_exists_and_delete() {
        let (creds, config) = no_settings();
        let adapter = MemoryAdapter::new();
        assert!(!adapter.file_exists(&creds, &config, "a.txt").await.unwrap());

        adapter.insert("a.txt", vec![1, 2, 3]);
        assert!(adapter.file_exists(&creds, &config, "a.txt").await.unwrap());

        adapter.delete_file(&creds, &config, "a.txt").await.unwrap();
        assert!(!adapter.file_exists(&creds, &config, "a.txt").await.unwrap());

        let result = adapter.delete_file(&creds, &config, "a.txt").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_synthesizes_folders() {
        let (creds, config) = no_settings();
        let adapter = MemoryAdapter::new();
        adapter.insert("dir/file1.txt", vec![1]);
        adapter.insert("dir/file2.txt", vec![2, 2]);
        adapter.insert("dir/sub/a.txt", vec![3]);
        adapter.insert("dir/sub/b.txt", vec![4]);
        adapter.insert("dirx/other.txt", vec![5]);

        let listing = adapter.list_contents(&creds, &config, "dir").await.unwrap();
        assert_eq!(listing.files.len(), 2);
        assert_eq!(listing.files[1].size, 2);
        assert_eq!(listing.folders.len(), 1);
        assert_eq!(listing.folders[0].path, "dir/sub");

        let root = adapter.list_contents(&creds, &config, "/").await.unwrap();
        assert!(root.files.is_empty());
        assert_eq!(root.folders.len(), 2);
    }

    #[tokio::test]
    async fn test_download_missing() {
        let temp = TempDir::new().unwrap();
        let (creds, config) = no_settings();
        let result = MemoryAdapter::new()
            .download_file(&creds, &config, "missing", &temp.path().join("x"))
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_clones_share_store() {
        let adapter = MemoryAdapter::for_kind(ProviderKind::Minio);
        let clone = adapter.clone();
        clone.insert("k", b"v".to_vec());
        assert_eq!(adapter.get("k"), Some(b"v".to_vec()));
        assert_eq!(adapter.keys(), vec!["k".to_string()]);
    }
}
