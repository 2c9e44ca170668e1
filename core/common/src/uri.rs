//! `cloud://<provider>/<path>` addressing.
//!
//! Anything that does not parse as a cloud URI is treated as a local path by
//! callers, so parsing reports failure with `None` rather than an error.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheme marker for cloud addresses.
pub const CLOUD_SCHEME: &str = "cloud://";

/// Parsed cloud address.
///
/// `provider_key` is a provider type (`s3`, `sftp`, ...) or a provider id;
/// `path` uses `/` separators and never starts with a slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CloudUri {
    provider_key: String,
    path: String,
}

impl CloudUri {
    /// Create a URI from its parts, normalizing the path.
    ///
    /// # Errors
    /// - Returns error if `provider_key` is empty or contains a separator
    pub fn new(provider_key: impl Into<String>, path: impl AsRef<str>) -> crate::Result<Self> {
        let provider_key = provider_key.into();
        if provider_key.is_empty() || provider_key.contains('/') {
            return Err(crate::Error::InvalidUri(format!(
                "invalid provider key '{}'",
                provider_key
            )));
        }
        Ok(Self {
            provider_key,
            path: normalize_path(path.as_ref()),
        })
    }

    /// Parse a `cloud://` string.
    ///
    /// Returns `None` for strings without the scheme marker or without a
    /// provider key.
    pub fn parse(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix(CLOUD_SCHEME)?;
        let (provider_key, path) = rest.split_once('/').unwrap_or((rest, ""));
        if provider_key.is_empty() {
            return None;
        }
        Some(Self {
            provider_key: provider_key.to_string(),
            path: normalize_path(path),
        })
    }

    /// Build a `cloud://` string, dropping any leading slash on `path`.
    pub fn build(provider_key: &str, path: &str) -> String {
        format!(
            "{}{}/{}",
            CLOUD_SCHEME,
            provider_key,
            path.trim_start_matches('/')
        )
    }

    /// Provider type or id this URI addresses.
    pub fn provider_key(&self) -> &str {
        &self.provider_key
    }

    /// Path inside the provider.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Append a relative path.
    pub fn join(&self, child: &str) -> Self {
        let child = normalize_path(child);
        let path = if self.path.is_empty() {
            child
        } else if child.is_empty() {
            self.path.clone()
        } else {
            format!("{}/{}", self.path.trim_end_matches('/'), child)
        };
        Self {
            provider_key: self.provider_key.clone(),
            path,
        }
    }
}

impl fmt::Display for CloudUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&Self::build(&self.provider_key, &self.path))
    }
}

/// Whether `path` is a cloud address.
pub fn is_cloud_path(path: &str) -> bool {
    CloudUri::parse(path).is_some()
}

fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_basic() {
        let uri = CloudUri::parse("cloud://s3/reports/out.csv").unwrap();
        assert_eq!(uri.provider_key(), "s3");
        assert_eq!(uri.path(), "reports/out.csv");
    }

    #[test]
    fn test_parse_provider_only() {
        let uri = CloudUri::parse("cloud://sftp").unwrap();
        assert_eq!(uri.provider_key(), "sftp");
        assert_eq!(uri.path(), "");
    }

    #[test]
    fn test_parse_rejects_local_and_malformed() {
        assert!(CloudUri::parse("/var/data/file.txt").is_none());
        assert!(CloudUri::parse("s3://bucket/key").is_none());
        assert!(CloudUri::parse("cloud://").is_none());
        assert!(CloudUri::parse("cloud:///path").is_none());
        assert!(!is_cloud_path("relative/file.txt"));
        assert!(is_cloud_path("cloud://azure/x"));
    }

    #[test]
    fn test_parse_normalizes_separators() {
        let uri = CloudUri::parse("cloud://gcp/\\incoming\\a.txt").unwrap();
        assert_eq!(uri.path(), "incoming/a.txt");
    }

    #[test]
    fn test_build_strips_leading_slash() {
        assert_eq!(CloudUri::build("minio", "/a/b"), "cloud://minio/a/b");
        assert_eq!(CloudUri::build("minio", "a/b"), "cloud://minio/a/b");
    }

    #[test]
    fn test_join() {
        let base = CloudUri::new("s3", "archive/").unwrap();
        assert_eq!(base.join("2024/a.csv").path(), "archive/2024/a.csv");
        let root = CloudUri::new("s3", "").unwrap();
        assert_eq!(root.join("/a.csv").path(), "a.csv");
    }

    #[test]
    fn test_display_round_trip() {
        let uri = CloudUri::new("provider-42", "/in/box").unwrap();
        assert_eq!(uri.to_string(), "cloud://provider-42/in/box");
        assert_eq!(CloudUri::parse(&uri.to_string()).unwrap(), uri);
    }

    #[test]
    fn test_new_rejects_empty_key() {
        assert!(CloudUri::new("", "x").is_err());
        assert!(CloudUri::new("a/b", "x").is_err());
    }

    proptest! {
        #[test]
        fn prop_build_parse_round_trip(
            key in "[a-z0-9_-]{1,16}",
            path in "/{0,3}[a-zA-Z0-9._-]{0,10}(/[a-zA-Z0-9._-]{1,10}){0,4}",
        ) {
            let built = CloudUri::build(&key, &path);
            let parsed = CloudUri::parse(&built).expect("built URI must parse");
            prop_assert_eq!(parsed.provider_key(), key.as_str());
            prop_assert_eq!(parsed.path(), path.trim_start_matches('/'));
        }
    }
}
