//! Provider registry client.
//!
//! Provider configuration and credentials live in an external store. Records
//! may carry their `config`/`credentials` payloads as JSON objects or as
//! serialized JSON text; this module normalizes both into typed maps before
//! any adapter sees them.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use stowage_common::{Error, ProviderKind, Result};

/// Non-secret provider configuration (bucket, host, region, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderConfig(Map<String, Value>);

/// Provider credentials. Never printed.
#[derive(Clone, Default, PartialEq)]
pub struct Credentials(Map<String, Value>);

macro_rules! impl_payload_map {
    ($ty:ident, $what:literal) => {
        impl $ty {
            /// Wrap an already-deserialized map.
            pub fn new(map: Map<String, Value>) -> Self {
                Self(map)
            }

            /// Get a string value by key.
            pub fn get_str(&self, key: &str) -> Option<&str> {
                self.0.get(key).and_then(Value::as_str)
            }

            /// Get a raw value by key.
            pub fn get(&self, key: &str) -> Option<&Value> {
                self.0.get(key)
            }

            /// Borrow the underlying map.
            pub fn as_map(&self) -> &Map<String, Value> {
                &self.0
            }

            /// Deserialize into a backend-specific settings type.
            ///
            /// # Errors
            /// - Required keys missing or of the wrong type
            pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
                serde_json::from_value(Value::Object(self.0.clone())).map_err(|e| {
                    Error::InvalidInput(format!(concat!("Invalid provider ", $what, ": {}"), e))
                })
            }
        }

        impl From<Value> for $ty {
            fn from(value: Value) -> Self {
                match value {
                    Value::Object(map) => Self(map),
                    _ => Self::default(),
                }
            }
        }
    };
}

impl_payload_map!(ProviderConfig, "configuration");
impl_payload_map!(Credentials, "credentials");

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credentials([REDACTED; {} keys])", self.0.len())
    }
}

/// A configured backend target, fetched for a single operation.
#[derive(Debug, Clone)]
pub struct ProviderDescriptor {
    /// Registry identifier.
    pub id: String,
    /// Backend family.
    pub kind: ProviderKind,
    /// Display name.
    pub name: String,
    /// Connection configuration.
    pub config: ProviderConfig,
    /// Secret material.
    pub credentials: Credentials,
}

/// Provider as stored in the configuration store.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderRecord {
    /// Registry identifier.
    pub id: String,
    /// Backend family.
    #[serde(rename = "type")]
    pub kind: ProviderKind,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Configuration: object, serialized JSON text, or null.
    #[serde(default)]
    pub config: Value,
    /// Credentials: object, serialized JSON text, or null.
    #[serde(default)]
    pub credentials: Value,
    /// Whether this is the default provider of its type.
    #[serde(default, alias = "isDefault")]
    pub is_default: bool,
}

impl ProviderRecord {
    /// Create a record from already-structured payloads.
    pub fn new(
        id: impl Into<String>,
        kind: ProviderKind,
        name: impl Into<String>,
        config: Value,
        credentials: Value,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            config,
            credentials,
            is_default: false,
        }
    }

    /// Mark this record as the default of its type.
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Normalize payloads into a descriptor.
    ///
    /// # Errors
    /// - Payload text is not valid JSON
    /// - Payload is neither an object, JSON text of an object, nor null
    pub fn into_descriptor(self) -> Result<ProviderDescriptor> {
        let config = normalize_payload(&self.id, "config", self.config)?;
        let credentials = normalize_payload(&self.id, "credentials", self.credentials)?;
        Ok(ProviderDescriptor {
            id: self.id,
            kind: self.kind,
            name: self.name,
            config: ProviderConfig::new(config),
            credentials: Credentials::new(credentials),
        })
    }
}

impl fmt::Debug for ProviderRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRecord")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("is_default", &self.is_default)
            .finish_non_exhaustive()
    }
}

fn normalize_payload(id: &str, field: &str, value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        Value::String(text) if text.trim().is_empty() => Ok(Map::new()),
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(Error::Serialization(format!(
                "Provider '{}' {} is not a JSON object",
                id, field
            ))),
            Err(e) => Err(Error::Serialization(format!(
                "Provider '{}' {} is not valid JSON: {}",
                id, field, e
            ))),
        },
        _ => Err(Error::Serialization(format!(
            "Provider '{}' {} has an unsupported shape",
            id, field
        ))),
    }
}

/// Read-only lookup of configured providers.
#[async_trait]
pub trait ProviderRegistry: Send + Sync {
    /// Fetch a provider by its identifier.
    ///
    /// # Errors
    /// - `Error::ProviderNotConfigured` when no such provider exists
    async fn get_by_id(&self, id: &str) -> Result<ProviderDescriptor>;

    /// Fetch the default provider of a type.
    ///
    /// # Errors
    /// - `Error::ProviderNotConfigured` when no provider of that type exists
    async fn get_default_by_type(&self, kind: ProviderKind) -> Result<ProviderDescriptor>;
}

/// In-process provider store backed by raw records.
///
/// Records are normalized on every fetch so that a credential change is
/// visible to the next operation.
#[derive(Debug, Default)]
pub struct MemoryProviderRegistry {
    records: RwLock<Vec<ProviderRecord>>,
}

impl MemoryProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry from records.
    pub fn with_records(records: Vec<ProviderRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Load a JSON array of records from a file.
    ///
    /// # Errors
    /// - File unreadable
    /// - File is not a JSON array of provider records
    pub async fn load_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let records: Vec<ProviderRecord> = serde_json::from_str(&content)?;
        debug!(count = records.len(), path = %path.as_ref().display(), "Loaded provider records");
        Ok(Self::with_records(records))
    }

    /// Insert a record, replacing any record with the same id.
    pub fn upsert(&self, record: ProviderRecord) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.retain(|r| r.id != record.id);
        records.push(record);
    }

    /// Remove a record by id. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let before = records.len();
        records.retain(|r| r.id != id);
        records.len() != before
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find<F>(&self, predicate: F) -> Option<ProviderRecord>
    where
        F: Fn(&ProviderRecord) -> bool,
    {
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        records.iter().find(|r| predicate(r)).cloned()
    }
}

#[async_trait]
impl ProviderRegistry for MemoryProviderRegistry {
    async fn get_by_id(&self, id: &str) -> Result<ProviderDescriptor> {
        let record = self.find(|r| r.id == id).ok_or_else(|| {
            Error::ProviderNotConfigured(format!("no provider with id '{}'", id))
        })?;
        debug!(provider_id = %id, kind = %record.kind, "Resolved provider by id");
        record.into_descriptor()
    }

    async fn get_default_by_type(&self, kind: ProviderKind) -> Result<ProviderDescriptor> {
        let record = self
            .find(|r| r.kind == kind && r.is_default)
            .or_else(|| self.find(|r| r.kind == kind))
            .ok_or_else(|| {
                Error::ProviderNotConfigured(format!("no default provider of type '{}'", kind))
            })?;
        debug!(provider_id = %record.id, kind = %kind, "Resolved default provider");
        record.into_descriptor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn s3_record(id: &str) -> ProviderRecord {
        ProviderRecord::new(
            id,
            ProviderKind::S3,
            "Reports bucket",
            json!({"bucket": "reports", "region": "eu-west-1"}),
            json!({"access_key_id": "AK", "secret_access_key": "SK"}),
        )
    }

    #[test]
    fn test_descriptor_from_object_payloads() {
        let descriptor = s3_record("p1").into_descriptor().unwrap();
        assert_eq!(descriptor.config.get_str("bucket"), Some("reports"));
        assert_eq!(descriptor.credentials.get_str("access_key_id"), Some("AK"));
    }

    #[test]
    fn test_descriptor_from_serialized_text() {
        let record = ProviderRecord::new(
            "p2",
            ProviderKind::Sftp,
            "Partner drop",
            Value::String(r#"{"host": "sftp.example.com", "port": 2222}"#.to_string()),
            Value::String(r#"{"password": "pw"}"#.to_string()),
        );
        let descriptor = record.into_descriptor().unwrap();
        assert_eq!(descriptor.config.get("port"), Some(&json!(2222)));
        assert_eq!(descriptor.credentials.get_str("password"), Some("pw"));
    }

    #[test]
    fn test_descriptor_null_and_empty_payloads() {
        let record = ProviderRecord::new(
            "p3",
            ProviderKind::Gcp,
            "",
            Value::Null,
            Value::String("  ".to_string()),
        );
        let descriptor = record.into_descriptor().unwrap();
        assert!(descriptor.config.as_map().is_empty());
        assert!(descriptor.credentials.as_map().is_empty());
    }

    #[test]
    fn test_descriptor_rejects_invalid_text() {
        let record = ProviderRecord::new(
            "p4",
            ProviderKind::S3,
            "",
            Value::String("{not json".to_string()),
            Value::Null,
        );
        assert!(matches!(
            record.into_descriptor(),
            Err(Error::Serialization(_))
        ));

        let record = ProviderRecord::new("p5", ProviderKind::S3, "", json!([1, 2]), Value::Null);
        assert!(record.into_descriptor().is_err());
    }

    #[test]
    fn test_credentials_debug_redacted() {
        let descriptor = s3_record("p1").into_descriptor().unwrap();
        let printed = format!("{:?}", descriptor);
        assert!(!printed.contains("SK"));
        assert!(printed.contains("REDACTED"));
    }

    #[test]
    fn test_decode_typed_settings() {
        #[derive(Deserialize)]
        struct Settings {
            bucket: String,
        }
        let descriptor = s3_record("p1").into_descriptor().unwrap();
        let settings: Settings = descriptor.config.decode().unwrap();
        assert_eq!(settings.bucket, "reports");

        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Missing {
            container: String,
        }
        assert!(matches!(
            descriptor.config.decode::<Missing>(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_get_by_id() {
        let registry = MemoryProviderRegistry::with_records(vec![s3_record("p1")]);
        let descriptor = registry.get_by_id("p1").await.unwrap();
        assert_eq!(descriptor.kind, ProviderKind::S3);

        let missing = registry.get_by_id("nope").await;
        assert!(matches!(missing, Err(Error::ProviderNotConfigured(_))));
    }

    #[tokio::test]
    async fn test_default_by_type_prefers_flagged_record() {
        let registry = MemoryProviderRegistry::with_records(vec![
            s3_record("first"),
            s3_record("flagged").as_default(),
        ]);
        let descriptor = registry.get_default_by_type(ProviderKind::S3).await.unwrap();
        assert_eq!(descriptor.id, "flagged");
    }

    #[tokio::test]
    async fn test_default_by_type_falls_back_to_first_of_type() {
        let registry = MemoryProviderRegistry::with_records(vec![s3_record("only")]);
        let descriptor = registry.get_default_by_type(ProviderKind::S3).await.unwrap();
        assert_eq!(descriptor.id, "only");
    }

    #[tokio::test]
    async fn test_default_by_type_never_substitutes_other_type() {
        let registry = MemoryProviderRegistry::with_records(vec![s3_record("p1").as_default()]);
        let result = registry.get_default_by_type(ProviderKind::Azure).await;
        assert!(matches!(result, Err(Error::ProviderNotConfigured(_))));
    }

    #[tokio::test]
    async fn test_upsert_sees_rotated_credentials() {
        let registry = MemoryProviderRegistry::with_records(vec![s3_record("p1")]);
        let mut rotated = s3_record("p1");
        rotated.credentials = json!({"access_key_id": "AK2", "secret_access_key": "SK2"});
        registry.upsert(rotated);

        assert_eq!(registry.len(), 1);
        let descriptor = registry.get_by_id("p1").await.unwrap();
        assert_eq!(descriptor.credentials.get_str("access_key_id"), Some("AK2"));
        assert!(registry.remove("p1"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_load_json_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("providers.json");
        tokio::fs::write(
            &path,
            r#"[{"id": "m1", "type": "minio", "name": "Lab", "isDefault": true,
                 "config": "{\"bucket\": \"lab\", \"endpoint\": \"http://localhost:9000\"}",
                 "credentials": {"accessKeyId": "a", "secretAccessKey": "b"}}]"#,
        )
        .await
        .unwrap();

        let registry = MemoryProviderRegistry::load_json_file(&path).await.unwrap();
        let descriptor = registry
            .get_default_by_type(ProviderKind::Minio)
            .await
            .unwrap();
        assert_eq!(descriptor.config.get_str("bucket"), Some("lab"));
    }
}
