//! Common types used throughout stowage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Backend family a provider belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Amazon S3 or any S3-compatible service.
    S3,
    /// Azure Blob Storage.
    Azure,
    /// Google Cloud Storage.
    Gcp,
    /// SFTP server reached through the external worker.
    Sftp,
    /// MinIO cluster (S3 protocol, path-style addressing).
    Minio,
}

impl ProviderKind {
    /// All supported kinds.
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::S3,
        ProviderKind::Azure,
        ProviderKind::Gcp,
        ProviderKind::Sftp,
        ProviderKind::Minio,
    ];

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::S3 => "s3",
            ProviderKind::Azure => "azure",
            ProviderKind::Gcp => "gcp",
            ProviderKind::Sftp => "sftp",
            ProviderKind::Minio => "minio",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(ProviderKind::S3),
            "azure" => Ok(ProviderKind::Azure),
            "gcp" | "gcs" => Ok(ProviderKind::Gcp),
            "sftp" => Ok(ProviderKind::Sftp),
            "minio" => Ok(ProviderKind::Minio),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown provider type '{}'",
                other
            ))),
        }
    }
}

/// A file or directory as seen by callers, whatever backend it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Last path component.
    pub name: String,
    /// Full path: a local path or a `cloud://` URI after façade normalization.
    pub path: String,
    /// Whether this is a directory (or an object-store prefix).
    pub is_directory: bool,
    /// Size in bytes, zero for directories.
    pub size: u64,
    /// Last modification time.
    pub modified_at: DateTime<Utc>,
}

impl FileEntry {
    /// Create a file entry.
    pub fn file(
        name: impl Into<String>,
        path: impl Into<String>,
        size: u64,
        modified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            is_directory: false,
            size,
            modified_at,
        }
    }

    /// Create a directory entry.
    pub fn directory(
        name: impl Into<String>,
        path: impl Into<String>,
        modified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            is_directory: true,
            size: 0,
            modified_at,
        }
    }
}

/// Secret string that zeroizes on drop.
///
/// Used for passwords, private keys and access keys once they have been
/// decoded out of a provider's credential map.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the inner value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}
