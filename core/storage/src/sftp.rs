//! SFTP adapter driven through the external worker.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use stowage_common::{Error, ProviderKind, Result, Secret};

use crate::adapter::{split_remote_path, ConnectionHealth, Listing, StorageAdapter};
use crate::bridge::{ConnectionParams, DirectoryCreated, WorkerBridge, WorkerOperation, WorkerRequest};
use crate::cache::{CacheKey, ListingCache};
use crate::providers::{Credentials, ProviderConfig};

fn default_port() -> u16 {
    22
}

#[derive(Debug, Deserialize)]
struct SftpSettings {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default, alias = "user")]
    username: Option<String>,
    #[serde(default)]
    root: Option<String>,
}

#[derive(Deserialize)]
struct SftpSecrets {
    #[serde(default, alias = "user")]
    username: Option<String>,
    #[serde(default)]
    password: Option<Secret>,
    #[serde(default, alias = "privateKey")]
    private_key: Option<Secret>,
    #[serde(default)]
    passphrase: Option<Secret>,
}

/// Resolved per-call target.
struct Target {
    connection: ConnectionParams,
    root: String,
}

impl Target {
    fn resolve(credentials: &Credentials, config: &ProviderConfig) -> Result<Self> {
        let settings: SftpSettings = config.decode()?;
        let secrets: SftpSecrets = credentials.decode()?;

        if settings.host.trim().is_empty() {
            return Err(Error::InvalidInput("SFTP provider requires 'host'".to_string()));
        }
        let username = settings
            .username
            .or(secrets.username)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::InvalidInput("SFTP provider requires 'username'".to_string()))?;

        let password = secrets.password.filter(|s| !s.is_empty());
        let private_key = secrets.private_key.filter(|s| !s.is_empty());
        if password.is_none() && private_key.is_none() {
            return Err(Error::InvalidInput(
                "SFTP credentials require 'password' or 'private_key'".to_string(),
            ));
        }

        let root = match settings.root.as_deref().map(|r| r.trim_end_matches('/')) {
            None | Some("") => String::new(),
            Some(r) if r.starts_with('/') => r.to_string(),
            Some(r) => format!("/{}", r),
        };

        Ok(Self {
            connection: ConnectionParams {
                host: settings.host,
                port: settings.port,
                username,
                password,
                private_key,
                passphrase: secrets.passphrase.filter(|s| !s.is_empty()),
            },
            root,
        })
    }

    /// Absolute remote path for a root-relative path.
    fn absolute(&self, path: &str) -> String {
        let path = path.trim_matches('/');
        if path.is_empty() {
            if self.root.is_empty() {
                "/".to_string()
            } else {
                self.root.clone()
            }
        } else {
            format!("{}/{}", self.root, path)
        }
    }

    /// Root-relative path for an absolute remote path.
    ///
    /// The root is only stripped on a path-segment boundary.
    fn relative(&self, absolute: &str) -> String {
        let rest = match absolute.strip_prefix(self.root.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => absolute,
        };
        rest.trim_start_matches('/').to_string()
    }

    /// Rewrite worker paths in a listing to root-relative form.
    fn relativize(&self, mut listing: Listing) -> Listing {
        for entry in listing.files.iter_mut().chain(listing.folders.iter_mut()) {
            entry.path = self.relative(&entry.path);
        }
        listing
    }

    fn cache_key(&self, absolute: &str) -> CacheKey {
        CacheKey::new(
            &self.connection.host,
            self.connection.port,
            &self.connection.username,
            absolute,
        )
    }
}

/// Adapter for SFTP servers.
///
/// Every primitive is one worker invocation. Listings are cached by
/// host, port, user and absolute path; writes do not invalidate them.
pub struct SftpAdapter {
    bridge: WorkerBridge,
    cache: Arc<dyn ListingCache>,
}

impl SftpAdapter {
    /// Create an adapter over a bridge and a listing cache.
    pub fn new(bridge: WorkerBridge, cache: Arc<dyn ListingCache>) -> Self {
        Self { bridge, cache }
    }

    /// Create directory `name` under `parent` (both root-relative).
    ///
    /// # Errors
    /// - Worker failure (translated)
    pub async fn create_directory(
        &self,
        credentials: &Credentials,
        config: &ProviderConfig,
        parent: &str,
        name: &str,
    ) -> Result<DirectoryCreated> {
        let target = Target::resolve(credentials, config)?;
        let mut created = self
            .bridge
            .create_directory(&target.connection, &target.absolute(parent), name, false)
            .await?;
        created.path = target.relative(&created.path);
        info!(path = %created.path, already_existed = created.already_existed, "Created SFTP directory");
        Ok(created)
    }

    async fn ensure_parent(&self, target: &Target, remote_path: &str) -> Result<()> {
        let (parent, _) = split_remote_path(remote_path);
        if parent.is_empty() {
            return Ok(());
        }
        let (grandparent, dir) = split_remote_path(parent);
        self.bridge
            .create_directory(&target.connection, &target.absolute(grandparent), dir, true)
            .await?;
        Ok(())
    }

    async fn run(&self, target: &Target, request: WorkerRequest) -> Result<crate::bridge::StatusResponse> {
        debug!(
            operation = request.operation.as_str(),
            host = %target.connection.host,
            path = %request.path,
            "SFTP operation"
        );
        self.bridge.execute(&request).await
    }
}

#[async_trait]
impl StorageAdapter for SftpAdapter {
    fn name(&self) -> &str {
        ProviderKind::Sftp.as_str()
    }

    async fn download_file(
        &self,
        credentials: &Credentials,
        config: &ProviderConfig,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<()> {
        let target = Target::resolve(credentials, config)?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let request = WorkerRequest::new(
            WorkerOperation::Download,
            target.connection.clone(),
            target.absolute(remote_path),
        )
        .with_local_path(local_path);
        self.run(&target, request).await?;
        Ok(())
    }

    async fn upload_file(
        &self,
        credentials: &Credentials,
        config: &ProviderConfig,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<()> {
        let target = Target::resolve(credentials, config)?;
        self.ensure_parent(&target, remote_path).await?;
        let request = WorkerRequest::new(
            WorkerOperation::Upload,
            target.connection.clone(),
            target.absolute(remote_path),
        )
        .with_local_path(local_path);
        self.run(&target, request).await?;
        Ok(())
    }

    async fn list_contents(
        &self,
        credentials: &Credentials,
        config: &ProviderConfig,
        remote_path: &str,
    ) -> Result<Listing> {
        let target = Target::resolve(credentials, config)?;
        let absolute = target.absolute(remote_path);
        let key = target.cache_key(&absolute);

        // Cached listings keep absolute paths; providers sharing a host but
        // not a root must each see paths relative to their own root.
        if let Some(listing) = self.cache.get(&key) {
            return Ok(target.relativize(listing));
        }

        let listing = self
            .bridge
            .list_directory(&target.connection, &absolute)
            .await?;
        self.cache.put(key, listing.clone());
        Ok(target.relativize(listing))
    }

    async fn file_exists(
        &self,
        credentials: &Credentials,
        config: &ProviderConfig,
        remote_path: &str,
    ) -> Result<bool> {
        let target = Target::resolve(credentials, config)?;
        let request = WorkerRequest::new(
            WorkerOperation::Stat,
            target.connection.clone(),
            target.absolute(remote_path),
        );
        let response = self.run(&target, request).await?;
        Ok(response.exists.unwrap_or(false))
    }

    async fn delete_file(
        &self,
        credentials: &Credentials,
        config: &ProviderConfig,
        remote_path: &str,
    ) -> Result<()> {
        let target = Target::resolve(credentials, config)?;
        let request = WorkerRequest::new(
            WorkerOperation::Delete,
            target.connection.clone(),
            target.absolute(remote_path),
        );
        self.run(&target, request).await?;
        Ok(())
    }

    async fn test_connection(
        &self,
        credentials: &Credentials,
        config: &ProviderConfig,
    ) -> Result<ConnectionHealth> {
        let target = Target::resolve(credentials, config)?;
        let started = Instant::now();
        let request = WorkerRequest::new(
            WorkerOperation::Ping,
            target.connection.clone(),
            target.absolute(""),
        );
        let response = self.run(&target, request).await?;
        Ok(ConnectionHealth {
            provider: ProviderKind::Sftp,
            latency_ms: started.elapsed().as_millis() as u64,
            detail: response.message.unwrap_or_else(|| {
                format!(
                    "connected to {}:{}",
                    target.connection.host, target.connection.port
                )
            }),
        })
    }
}
