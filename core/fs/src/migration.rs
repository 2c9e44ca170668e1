//! Bulk upload of a local directory tree to a cloud provider.
//!
//! Migration is best effort: every file is attempted, failures are collected
//! per file and never abort the run. Only precondition failures (missing
//! directory, unconfigured provider) fail the whole call.

use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use stowage_common::{CloudUri, Error, ProviderKind, Result};
use stowage_storage::{AdapterRegistry, ProviderRegistry};

use crate::retry::{RetryConfig, RetryExecutor};

/// Migration tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Descend into sub-directories.
    pub recursive: bool,
    /// Uploads in flight at once.
    pub concurrency: usize,
    /// Retries per file for transient failures.
    pub max_retries: u32,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            recursive: true,
            concurrency: 1,
            max_retries: 0,
        }
    }
}

/// A file that could not be migrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationFailure {
    /// Path relative to the migrated directory, `/`-separated.
    pub file: String,
    /// Why the upload failed.
    pub reason: String,
}

/// Outcome of a migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Whether every file was uploaded.
    pub success: bool,
    /// Number of files uploaded.
    pub files_uploaded: usize,
    /// Per-file failures, sorted by file.
    pub errors: Vec<MigrationFailure>,
    /// Destination root.
    pub cloud_uri: CloudUri,
}

/// A local file queued for upload.
struct PendingFile {
    local: PathBuf,
    relative: String,
}

/// Walks a local tree and uploads it through the adapter for one provider type.
pub struct MigrationEngine {
    providers: Arc<dyn ProviderRegistry>,
    adapters: Arc<AdapterRegistry>,
    config: MigrationConfig,
}

impl MigrationEngine {
    /// Create an engine.
    pub fn new(
        providers: Arc<dyn ProviderRegistry>,
        adapters: Arc<AdapterRegistry>,
        config: MigrationConfig,
    ) -> Self {
        Self {
            providers,
            adapters,
            config,
        }
    }

    /// Upload every file under `local_dir` to `cloud_base_path` on the
    /// default provider of `kind`.
    ///
    /// # Errors
    /// - `local_dir` missing or not a directory
    /// - No provider of `kind` configured, or no adapter for it
    pub async fn migrate(
        &self,
        local_dir: &Path,
        kind: ProviderKind,
        cloud_base_path: &str,
    ) -> Result<MigrationReport> {
        let meta = tokio::fs::metadata(local_dir).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                Error::NotFound(format!("Directory not found: {}", local_dir.display()))
            }
            _ => e.into(),
        })?;
        if !meta.is_dir() {
            return Err(Error::InvalidInput(format!(
                "Not a directory: {}",
                local_dir.display()
            )));
        }

        let descriptor = self.providers.get_default_by_type(kind).await?;
        let adapter = self.adapters.resolve(kind)?;
        let base = CloudUri::new(kind.as_str(), cloud_base_path)?;

        let (pending, mut errors) = collect_files(local_dir, self.config.recursive).await?;
        info!(
            dir = %local_dir.display(),
            provider = %descriptor.id,
            files = pending.len(),
            destination = %base,
            "Starting migration"
        );

        let retry = RetryExecutor::new(RetryConfig::new(self.config.max_retries));
        let descriptor = &descriptor;
        let adapter = &adapter;
        let retry = &retry;
        let base = &base;

        let (files_uploaded, failures) = stream::iter(pending)
            .map(|file| async move {
                let remote = base.join(&file.relative);
                let result = retry
                    .execute(|| {
                        adapter.upload_file(
                            &descriptor.credentials,
                            &descriptor.config,
                            &file.local,
                            remote.path(),
                        )
                    })
                    .await;
                (file.relative, result)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .fold((0usize, Vec::new()), |(uploaded, mut failures), (file, result)| async move {
                match result {
                    Ok(()) => {
                        debug!(file = %file, "Migrated file");
                        (uploaded + 1, failures)
                    }
                    Err(err) => {
                        warn!(file = %file, error = %err, "Failed to migrate file");
                        failures.push(MigrationFailure {
                            file,
                            reason: err.to_string(),
                        });
                        (uploaded, failures)
                    }
                }
            })
            .await;

        errors.extend(failures);
        errors.sort_by(|a, b| a.file.cmp(&b.file));

        info!(
            uploaded = files_uploaded,
            failed = errors.len(),
            "Migration finished"
        );

        Ok(MigrationReport {
            success: errors.is_empty(),
            files_uploaded,
            errors,
            cloud_uri: base.clone(),
        })
    }
}

/// Walk `dir` off the async runtime.
///
/// Symlinks are followed. Entries that cannot be read, including dangling
/// links and link cycles, become failures instead of aborting the walk.
async fn collect_files(
    dir: &Path,
    recursive: bool,
) -> Result<(Vec<PendingFile>, Vec<MigrationFailure>)> {
    let root = dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let max_depth = if recursive { usize::MAX } else { 1 };
        let mut files = Vec::new();
        let mut failures = Vec::new();

        for entry in WalkDir::new(&root)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(true)
            .sort_by_file_name()
        {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    let relative = relative_path(&root, entry.path());
                    files.push(PendingFile {
                        local: entry.into_path(),
                        relative,
                    });
                }
                Ok(_) => {}
                Err(err) => {
                    let file = err
                        .path()
                        .map(|p| relative_path(&root, p))
                        .unwrap_or_default();
                    failures.push(MigrationFailure {
                        file,
                        reason: err.to_string(),
                    });
                }
            }
        }
        (files, failures)
    })
    .await
    .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))
}

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
