//! Storage adapter trait definition.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use stowage_common::{FileEntry, ProviderKind, Result};

use crate::providers::{Credentials, ProviderConfig};

/// Directory listing split into plain files and sub-directories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Non-directory entries.
    pub files: Vec<FileEntry>,
    /// Directory entries (or object-store prefixes).
    pub folders: Vec<FileEntry>,
}

impl Listing {
    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.files.len() + self.folders.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.folders.is_empty()
    }

    /// Consume the listing, folders first.
    pub fn into_entries(self) -> Vec<FileEntry> {
        let mut entries = self.folders;
        entries.extend(self.files);
        entries
    }
}

/// Result of a successful connection probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionHealth {
    /// Backend that answered.
    pub provider: ProviderKind,
    /// Round trip of the probe.
    pub latency_ms: u64,
    /// Human-readable detail from the backend.
    pub detail: String,
}

/// Uniform capability contract implemented once per backend.
///
/// Every call receives the provider's configuration and credentials as
/// fetched for the current operation; adapters must not hold on to them.
/// Adapters never retry: each call is independently retriable by the caller.
///
/// Remote paths are relative to the provider root and use `/` separators.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Adapter name for logging (e.g., "s3", "sftp").
    fn name(&self) -> &str;

    /// Download `remote_path` into the local file `local_path`.
    ///
    /// # Postconditions
    /// - `local_path` holds the complete object content
    ///
    /// # Errors
    /// - Remote object not found
    /// - Network/authentication errors
    async fn download_file(
        &self,
        credentials: &Credentials,
        config: &ProviderConfig,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<()>;

    /// Upload the local file `local_path` to `remote_path`, replacing it.
    ///
    /// # Errors
    /// - Local file unreadable
    /// - Network/authentication errors
    async fn upload_file(
        &self,
        credentials: &Credentials,
        config: &ProviderConfig,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<()>;

    /// List the direct children of `remote_path`.
    async fn list_contents(
        &self,
        credentials: &Credentials,
        config: &ProviderConfig,
        remote_path: &str,
    ) -> Result<Listing>;

    /// Check if `remote_path` exists.
    async fn file_exists(
        &self,
        credentials: &Credentials,
        config: &ProviderConfig,
        remote_path: &str,
    ) -> Result<bool>;

    /// Delete a file.
    ///
    /// # Errors
    /// - File not found
    async fn delete_file(
        &self,
        credentials: &Credentials,
        config: &ProviderConfig,
        remote_path: &str,
    ) -> Result<()>;

    /// Probe the backend with the given settings.
    async fn test_connection(
        &self,
        credentials: &Credentials,
        config: &ProviderConfig,
    ) -> Result<ConnectionHealth>;
}

/// Split a remote path into its parent and last component.
pub(crate) fn split_remote_path(path: &str) -> (&str, &str) {
    let trimmed = path.trim_matches('/');
    match trimmed.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", trimmed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_listing_flattens_folders_first() {
        let listing = Listing {
            files: vec![FileEntry::file("a.csv", "in/a.csv", 3, Utc::now())],
            folders: vec![FileEntry::directory("old", "in/old", Utc::now())],
        };
        assert_eq!(listing.len(), 2);

        let entries = listing.into_entries();
        assert!(entries[0].is_directory);
        assert_eq!(entries[1].name, "a.csv");
    }

    #[test]
    fn test_listing_serialization() {
        let listing = Listing {
            files: vec![FileEntry::file("a", "a", 1, Utc::now())],
            folders: Vec::new(),
        };
        let json = serde_json::to_string(&listing).unwrap();
        let decoded: Listing = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, listing);
    }

    #[test]
    fn test_split_remote_path() {
        assert_eq!(split_remote_path("a/b/c.txt"), ("a/b", "c.txt"));
        assert_eq!(split_remote_path("/c.txt"), ("", "c.txt"));
        assert_eq!(split_remote_path("dir/"), ("", "dir"));
    }
}
