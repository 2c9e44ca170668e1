//! JSON contract between the bridge and the worker process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use stowage_common::{FileEntry, Secret};

/// Operations the worker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerOperation {
    /// List a remote directory.
    List,
    /// Create a remote directory.
    Mkdir,
    /// Upload a local file.
    Upload,
    /// Download a remote file.
    Download,
    /// Check whether a remote path exists.
    Stat,
    /// Delete a remote file.
    Delete,
    /// Open and close a session.
    Ping,
}

impl WorkerOperation {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerOperation::List => "list",
            WorkerOperation::Mkdir => "mkdir",
            WorkerOperation::Upload => "upload",
            WorkerOperation::Download => "download",
            WorkerOperation::Stat => "stat",
            WorkerOperation::Delete => "delete",
            WorkerOperation::Ping => "ping",
        }
    }
}

/// Connection parameters handed to the worker.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionParams {
    /// Remote host.
    pub host: String,
    /// Remote port.
    pub port: u16,
    /// Login user.
    pub username: String,
    /// Password authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<Secret>,
    /// Private key (PEM text) authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<Secret>,
    /// Passphrase for the private key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<Secret>,
}

/// Self-contained payload written for one worker invocation.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerRequest {
    /// Operation to run.
    pub operation: WorkerOperation,
    /// Where to connect.
    pub connection: ConnectionParams,
    /// Remote path the operation targets.
    pub path: String,
    /// Directory name for `mkdir`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Local file for `upload`/`download`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    /// Create missing parents for `mkdir`.
    pub recursive: bool,
}

impl WorkerRequest {
    /// Request with only an operation and a remote path.
    pub fn new(operation: WorkerOperation, connection: ConnectionParams, path: impl Into<String>) -> Self {
        Self {
            operation,
            connection,
            path: path.into(),
            name: None,
            local_path: None,
            recursive: false,
        }
    }

    /// Set the directory name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the local file.
    pub fn with_local_path(mut self, local_path: impl Into<PathBuf>) -> Self {
        self.local_path = Some(local_path.into());
        self
    }

    /// Create missing parents.
    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }
}

/// Entry as reported by the worker.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerEntry {
    /// Entry name.
    pub name: String,
    /// Absolute remote path, when the worker reports it.
    #[serde(default)]
    pub path: Option<String>,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Modification time in milliseconds since the epoch.
    #[serde(default)]
    pub modify_time: Option<i64>,
    /// Directory flag.
    #[serde(default)]
    pub is_directory: bool,
}

impl WorkerEntry {
    /// Normalize into a [`FileEntry`] located under `dir`.
    pub fn into_file_entry(self, dir: &str, is_directory: bool) -> FileEntry {
        let path = self.path.unwrap_or_else(|| {
            if dir.ends_with('/') {
                format!("{}{}", dir, self.name)
            } else {
                format!("{}/{}", dir, self.name)
            }
        });
        let modified_at = self
            .modify_time
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_default();
        FileEntry {
            name: self.name,
            path,
            is_directory: is_directory || self.is_directory,
            size: if is_directory { 0 } else { self.size },
            modified_at,
        }
    }
}

/// Response to `list`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    /// Failure flag.
    #[serde(default)]
    pub error: bool,
    /// Failure text.
    #[serde(default)]
    pub message: Option<String>,
    /// Listed path as resolved by the server.
    #[serde(default)]
    pub path: Option<String>,
    /// Parent of the listed path.
    #[serde(default)]
    pub parent_path: Option<String>,
    /// Plain files.
    #[serde(default)]
    pub files: Vec<WorkerEntry>,
    /// Sub-directories.
    #[serde(default)]
    pub folders: Vec<WorkerEntry>,
}

/// Response to `mkdir`.
#[derive(Debug, Clone, Deserialize)]
pub struct MkdirResponse {
    /// Success flag.
    #[serde(default)]
    pub success: bool,
    /// Failure text.
    #[serde(default)]
    pub error: Option<String>,
    /// Directory name.
    #[serde(default)]
    pub name: Option<String>,
    /// Directory path.
    #[serde(default)]
    pub path: Option<String>,
    /// Creation time (RFC 3339).
    #[serde(default, rename = "creationDate")]
    pub creation_date: Option<String>,
    /// Whether the directory was already there.
    #[serde(default, alias = "alreadyExisted")]
    pub already_existed: bool,
}

/// Response to every other operation.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    /// Success flag.
    #[serde(default)]
    pub success: bool,
    /// Failure text.
    #[serde(default)]
    pub error: Option<String>,
    /// Existence flag for `stat`.
    #[serde(default)]
    pub exists: Option<bool>,
    /// Informational text.
    #[serde(default)]
    pub message: Option<String>,
}

/// Outcome of a directory creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryCreated {
    /// Directory name.
    pub name: String,
    /// Remote path.
    pub path: String,
    /// Creation time, when reported.
    pub created_at: Option<DateTime<Utc>>,
    /// Whether the directory was already there.
    pub already_existed: bool,
}

/// Extract the single JSON document from worker stdout.
///
/// The whole trimmed output is tried first; workers that log before
/// answering are supported by falling back to the last non-empty line.
pub fn parse_worker_output(stdout: &str) -> Option<Value> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }
    let last = trimmed.lines().rev().find(|line| !line.trim().is_empty())?;
    match serde_json::from_str::<Value>(last.trim()) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}
