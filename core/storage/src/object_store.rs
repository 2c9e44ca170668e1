//! Object-store adapters (S3, MinIO, Azure Blob, GCS) built on OpenDAL.
//!
//! An `Operator` is built for every call from the settings handed in, so a
//! credential rotation in the provider registry takes effect immediately.
//! Object stores have a flat namespace: directories are key prefixes.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, Utc};
use opendal::{services, ErrorKind, Operator};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

use stowage_common::{Error, FileEntry, ProviderKind, Result, Secret};

use crate::adapter::{ConnectionHealth, Listing, StorageAdapter};
use crate::providers::{Credentials, ProviderConfig};

/// Which object-store protocol an adapter speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectStoreFlavor {
    /// Amazon S3 or an S3-compatible service.
    S3,
    /// MinIO: S3 protocol against an explicit endpoint.
    Minio,
    /// Azure Blob Storage.
    Azure,
    /// Google Cloud Storage.
    Gcs,
}

impl ObjectStoreFlavor {
    /// Provider kind served by this flavor.
    pub fn kind(&self) -> ProviderKind {
        match self {
            ObjectStoreFlavor::S3 => ProviderKind::S3,
            ObjectStoreFlavor::Minio => ProviderKind::Minio,
            ObjectStoreFlavor::Azure => ProviderKind::Azure,
            ObjectStoreFlavor::Gcs => ProviderKind::Gcp,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Deserialize)]
struct S3Settings {
    bucket: String,
    #[serde(default = "default_region")]
    region: String,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    root: Option<String>,
}

#[derive(Deserialize)]
struct S3Secrets {
    #[serde(alias = "accessKeyId")]
    access_key_id: Secret,
    #[serde(alias = "secretAccessKey")]
    secret_access_key: Secret,
    #[serde(default, alias = "sessionToken")]
    session_token: Option<Secret>,
}

#[derive(Debug, Deserialize)]
struct AzureSettings {
    container: String,
    #[serde(default, alias = "accountName")]
    account_name: Option<String>,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    root: Option<String>,
}

#[derive(Deserialize)]
struct AzureSecrets {
    #[serde(default, alias = "accountName")]
    account_name: Option<String>,
    #[serde(alias = "accountKey")]
    account_key: Secret,
}

#[derive(Debug, Deserialize)]
struct GcsSettings {
    bucket: String,
    #[serde(default)]
    root: Option<String>,
}

#[derive(Deserialize)]
struct GcsSecrets {
    #[serde(alias = "serviceAccountKey")]
    service_account_key: Value,
}

fn validate_endpoint(endpoint: &str) -> Result<()> {
    let parsed = url::Url::parse(endpoint)
        .map_err(|e| Error::InvalidInput(format!("Invalid endpoint '{}': {}", endpoint, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::InvalidInput(format!(
            "Endpoint '{}' must use http or https, not '{}'",
            endpoint, other
        ))),
    }
}

fn root_of(root: Option<&str>) -> String {
    match root.map(|r| r.trim_matches('/')) {
        None | Some("") => "/".to_string(),
        Some(r) => format!("/{}/", r),
    }
}

/// Encode a GCS service-account key the way OpenDAL expects it.
fn gcs_credential(key: &Value) -> Result<String> {
    let json = match key {
        Value::Object(_) => key.to_string(),
        Value::String(text) => {
            let parsed: Value = serde_json::from_str(text).map_err(|e| {
                Error::InvalidInput(format!("service_account_key is not valid JSON: {}", e))
            })?;
            if !parsed.is_object() {
                return Err(Error::InvalidInput(
                    "service_account_key must be a JSON object".to_string(),
                ));
            }
            text.clone()
        }
        _ => {
            return Err(Error::InvalidInput(
                "service_account_key must be a JSON object".to_string(),
            ))
        }
    };
    Ok(base64::engine::general_purpose::STANDARD.encode(json))
}

fn config_error(flavor: ObjectStoreFlavor, err: opendal::Error) -> Error {
    Error::InvalidInput(format!("Invalid {} configuration: {}", flavor.kind(), err))
}

/// Build an operator for one call.
fn build_operator(
    flavor: ObjectStoreFlavor,
    credentials: &Credentials,
    config: &ProviderConfig,
) -> Result<Operator> {
    match flavor {
        ObjectStoreFlavor::S3 | ObjectStoreFlavor::Minio => {
            let settings: S3Settings = config.decode()?;
            let secrets: S3Secrets = credentials.decode()?;

            let mut builder = services::S3::default()
                .bucket(&settings.bucket)
                .region(&settings.region)
                .root(&root_of(settings.root.as_deref()))
                .access_key_id(secrets.access_key_id.expose())
                .secret_access_key(secrets.secret_access_key.expose());

            match (flavor, settings.endpoint.as_deref()) {
                (_, Some(endpoint)) => {
                    validate_endpoint(endpoint)?;
                    builder = builder.endpoint(endpoint);
                }
                (ObjectStoreFlavor::Minio, None) => {
                    return Err(Error::InvalidInput(
                        "MinIO provider requires 'endpoint'".to_string(),
                    ));
                }
                _ => {}
            }
            if let Some(token) = secrets.session_token.as_ref() {
                builder = builder.session_token(token.expose());
            }

            Ok(Operator::new(builder)
                .map_err(|e| config_error(flavor, e))?
                .finish())
        }
        ObjectStoreFlavor::Azure => {
            let settings: AzureSettings = config.decode()?;
            let secrets: AzureSecrets = credentials.decode()?;

            let account = settings
                .account_name
                .or(secrets.account_name)
                .filter(|a| !a.is_empty())
                .ok_or_else(|| {
                    Error::InvalidInput("Azure provider requires 'account_name'".to_string())
                })?;
            let endpoint = match settings.endpoint {
                Some(endpoint) => {
                    validate_endpoint(&endpoint)?;
                    endpoint
                }
                None => format!("https://{}.blob.core.windows.net", account),
            };

            let builder = services::Azblob::default()
                .container(&settings.container)
                .account_name(&account)
                .account_key(secrets.account_key.expose())
                .endpoint(&endpoint)
                .root(&root_of(settings.root.as_deref()));

            Ok(Operator::new(builder)
                .map_err(|e| config_error(flavor, e))?
                .finish())
        }
        ObjectStoreFlavor::Gcs => {
            let settings: GcsSettings = config.decode()?;
            let secrets: GcsSecrets = credentials.decode()?;

            let builder = services::Gcs::default()
                .bucket(&settings.bucket)
                .credential(&gcs_credential(&secrets.service_account_key)?)
                .root(&root_of(settings.root.as_deref()));

            Ok(Operator::new(builder)
                .map_err(|e| config_error(flavor, e))?
                .finish())
        }
    }
}

/// Map an OpenDAL error onto the shared error kinds.
pub(crate) fn map_opendal_error(err: opendal::Error, path: &str) -> Error {
    match err.kind() {
        ErrorKind::NotFound => Error::NotFound(format!("Object not found: {}", path)),
        ErrorKind::PermissionDenied => Error::Authentication(err.to_string()),
        _ if err.is_temporary() => Error::Network(err.to_string()),
        _ => Error::Backend(err.to_string()),
    }
}

/// Parse a modification time as rendered by the backend metadata.
pub(crate) fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = text.strip_suffix(" UTC").unwrap_or(text);
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|dt| dt.and_utc())
}

fn object_key(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

fn dir_key(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("{}/", trimmed)
    }
}

async fn read_object(op: &Operator, path: &str) -> Result<Vec<u8>> {
    let key = object_key(path);
    let buffer = op
        .read(&key)
        .await
        .map_err(|e| map_opendal_error(e, &key))?;
    Ok(buffer.to_vec())
}

async fn write_object(op: &Operator, path: &str, data: Vec<u8>) -> Result<()> {
    let key = object_key(path);
    if key.is_empty() || key.ends_with('/') {
        return Err(Error::InvalidInput(format!("Not an object key: '{}'", path)));
    }
    op.write(&key, data)
        .await
        .map_err(|e| map_opendal_error(e, &key))?;
    Ok(())
}

async fn list_prefix(op: &Operator, path: &str) -> Result<Listing> {
    let prefix = dir_key(path);
    let entries = op
        .list(&prefix)
        .await
        .map_err(|e| map_opendal_error(e, &prefix))?;

    let mut listing = Listing::default();
    for entry in entries {
        let entry_path = entry.path().trim_end_matches('/');
        if entry_path.is_empty() || entry.path() == prefix {
            continue;
        }
        let name = entry.name().trim_end_matches('/').to_string();
        let metadata = entry.metadata();
        let modified_at = metadata
            .last_modified()
            .and_then(|t| parse_timestamp(&t.to_string()))
            .unwrap_or_default();

        if metadata.mode().is_dir() {
            listing
                .folders
                .push(FileEntry::directory(name, entry_path, modified_at));
        } else {
            listing.files.push(FileEntry::file(
                name,
                entry_path,
                metadata.content_length(),
                modified_at,
            ));
        }
    }
    Ok(listing)
}

async fn object_exists(op: &Operator, path: &str) -> Result<bool> {
    let key = object_key(path);
    match op.stat(&key).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(map_opendal_error(e, &key)),
    }
}

async fn delete_object(op: &Operator, path: &str) -> Result<()> {
    if !object_exists(op, path).await? {
        return Err(Error::NotFound(format!("Object not found: {}", path)));
    }
    let key = object_key(path);
    op.delete(&key)
        .await
        .map_err(|e| map_opendal_error(e, &key))
}

/// Adapter for the OpenDAL-backed object stores.
#[derive(Debug, Clone, Copy)]
pub struct ObjectStoreAdapter {
    flavor: ObjectStoreFlavor,
}

impl ObjectStoreAdapter {
    /// Create an adapter for a flavor.
    pub fn new(flavor: ObjectStoreFlavor) -> Self {
        Self { flavor }
    }

    /// Amazon S3.
    pub fn s3() -> Self {
        Self::new(ObjectStoreFlavor::S3)
    }

    /// MinIO.
    pub fn minio() -> Self {
        Self::new(ObjectStoreFlavor::Minio)
    }

    /// Azure Blob Storage.
    pub fn azure() -> Self {
        Self::new(ObjectStoreFlavor::Azure)
    }

    /// Google Cloud Storage.
    pub fn gcs() -> Self {
        Self::new(ObjectStoreFlavor::Gcs)
    }

    /// Flavor served by this adapter.
    pub fn flavor(&self) -> ObjectStoreFlavor {
        self.flavor
    }

    fn operator(&self, credentials: &Credentials, config: &ProviderConfig) -> Result<Operator> {
        build_operator(self.flavor, credentials, config)
    }
}

#[async_trait]
impl StorageAdapter for ObjectStoreAdapter {
    fn name(&self) -> &str {
        self.flavor.kind().as_str()
    }

    async fn download_file(
        &self,
        credentials: &Credentials,
        config: &ProviderConfig,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<()> {
        let op = self.operator(credentials, config)?;
        let data = read_object(&op, remote_path).await?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, &data).await?;
        debug!(adapter = self.name(), path = remote_path, bytes = data.len(), "Downloaded object");
        Ok(())
    }

    async fn upload_file(
        &self,
        credentials: &Credentials,
        config: &ProviderConfig,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<()> {
        let op = self.operator(credentials, config)?;
        let data = tokio::fs::read(local_path).await?;
        let size = data.len();
        write_object(&op, remote_path, data).await?;
        debug!(adapter = self.name(), path = remote_path, bytes = size, "Uploaded object");
        Ok(())
    }

    async fn list_contents(
        &self,
        credentials: &Credentials,
        config: &ProviderConfig,
        remote_path: &str,
    ) -> Result<Listing> {
        let op = self.operator(credentials, config)?;
        list_prefix(&op, remote_path).await
    }

    async fn file_exists(
        &self,
        credentials: &Credentials,
        config: &ProviderConfig,
        remote_path: &str,
    ) -> Result<bool> {
        let op = self.operator(credentials, config)?;
        object_exists(&op, remote_path).await
    }

    async fn delete_file(
        &self,
        credentials: &Credentials,
        config: &ProviderConfig,
        remote_path: &str,
    ) -> Result<()> {
        let op = self.operator(credentials, config)?;
        delete_object(&op, remote_path).await
    }

    async fn test_connection(
        &self,
        credentials: &Credentials,
        config: &ProviderConfig,
    ) -> Result<ConnectionHealth> {
        let op = self.operator(credentials, config)?;
        let started = Instant::now();
        op.check().await.map_err(|e| map_opendal_error(e, "/"))?;
        Ok(ConnectionHealth {
            provider: self.flavor.kind(),
            latency_ms: started.elapsed().as_millis() as u64,
            detail: format!("{} reachable", op.info().name()),
        })
    }
}
