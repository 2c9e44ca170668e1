//! External process bridge.
//!
//! Some SFTP primitives are delegated to a short-lived worker process instead
//! of an in-process client. Each call:
//! - writes a self-contained JSON payload to a scratch file
//! - launches `program args... <payload-file>`
//! - reads exactly one JSON document from the worker's stdout
//! - deletes the payload once the worker has exited, whatever the outcome
//!
//! Every call runs under a hard deadline. On timeout the worker is killed and
//! `Error::BridgeTimeout` is returned; the remote side may have partially
//! applied the operation.

pub mod protocol;
pub mod runner;
pub mod translate;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use stowage_common::{Error, Result};

use crate::adapter::Listing;
use crate::scratch::ScratchFile;

pub use protocol::{
    parse_worker_output, ConnectionParams, DirectoryCreated, ListResponse, MkdirResponse,
    StatusResponse, WorkerEntry, WorkerOperation, WorkerRequest,
};
pub use runner::{ProcessOutput, ProcessRunner, RunOutcome, TokioProcessRunner};
pub use translate::{classify_worker_error, translate_worker_error, FailureCategory};

use translate::worker_failure;

/// Program (and leading arguments) implementing the worker protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCommand {
    /// Executable name or path.
    pub program: String,
    /// Arguments placed before the payload path.
    #[serde(default)]
    pub args: Vec<String>,
}

impl WorkerCommand {
    /// Create a command without arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl Default for WorkerCommand {
    fn default() -> Self {
        Self::new("stowage-sftp-worker")
    }
}

/// Per-operation deadlines, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeTimeouts {
    /// Directory listing.
    pub list_secs: u64,
    /// Directory creation.
    pub mkdir_secs: u64,
    /// Upload and download.
    pub transfer_secs: u64,
    /// Stat, delete and ping.
    pub command_secs: u64,
}

impl BridgeTimeouts {
    /// Deadline for an operation.
    pub fn for_operation(&self, operation: WorkerOperation) -> Duration {
        let secs = match operation {
            WorkerOperation::List => self.list_secs,
            WorkerOperation::Mkdir => self.mkdir_secs,
            WorkerOperation::Upload | WorkerOperation::Download => self.transfer_secs,
            WorkerOperation::Stat | WorkerOperation::Delete | WorkerOperation::Ping => {
                self.command_secs
            }
        };
        Duration::from_secs(secs)
    }
}

impl Default for BridgeTimeouts {
    fn default() -> Self {
        Self {
            list_secs: 30,
            mkdir_secs: 20,
            transfer_secs: 300,
            command_secs: 20,
        }
    }
}

/// Typed front end to the worker process.
pub struct WorkerBridge {
    command: WorkerCommand,
    runner: Arc<dyn ProcessRunner>,
    scratch_dir: PathBuf,
    timeouts: BridgeTimeouts,
}

impl WorkerBridge {
    /// Create a bridge that launches `command` as a child process and keeps
    /// its payload files under `scratch_dir`.
    pub fn new(command: WorkerCommand, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            runner: Arc::new(TokioProcessRunner),
            scratch_dir: scratch_dir.into(),
            timeouts: BridgeTimeouts::default(),
        }
    }

    /// Replace the process runner.
    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Replace the deadlines.
    pub fn with_timeouts(mut self, timeouts: BridgeTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Configured deadlines.
    pub fn timeouts(&self) -> &BridgeTimeouts {
        &self.timeouts
    }

    /// Directory holding payload files.
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// List a remote directory.
    ///
    /// Entry paths are the worker's absolute remote paths.
    pub async fn list_directory(&self, connection: &ConnectionParams, path: &str) -> Result<Listing> {
        let request = WorkerRequest::new(WorkerOperation::List, connection.clone(), path);
        let response: ListResponse = self.invoke(&request).await?;

        if response.error {
            let message = response
                .message
                .unwrap_or_else(|| "worker reported a listing failure".to_string());
            return Err(worker_failure(&message));
        }

        let dir = response.path.unwrap_or_else(|| path.to_string());
        Ok(Listing {
            files: response
                .files
                .into_iter()
                .map(|entry| entry.into_file_entry(&dir, false))
                .collect(),
            folders: response
                .folders
                .into_iter()
                .map(|entry| entry.into_file_entry(&dir, true))
                .collect(),
        })
    }

    /// Create `name` under the remote directory `parent`.
    pub async fn create_directory(
        &self,
        connection: &ConnectionParams,
        parent: &str,
        name: &str,
        recursive: bool,
    ) -> Result<DirectoryCreated> {
        let mut request =
            WorkerRequest::new(WorkerOperation::Mkdir, connection.clone(), parent).with_name(name);
        if recursive {
            request = request.recursive();
        }
        let response: MkdirResponse = self.invoke(&request).await?;

        if !response.success {
            let message = response
                .error
                .unwrap_or_else(|| "worker reported a directory creation failure".to_string());
            return Err(worker_failure(&message));
        }

        let created_at = response
            .creation_date
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(DirectoryCreated {
            name: response.name.unwrap_or_else(|| name.to_string()),
            path: response
                .path
                .unwrap_or_else(|| format!("{}/{}", parent.trim_end_matches('/'), name)),
            created_at,
            already_existed: response.already_existed,
        })
    }

    /// Run a transfer, stat, delete or ping request.
    ///
    /// # Errors
    /// - Worker reported `success: false` (translated)
    pub async fn execute(&self, request: &WorkerRequest) -> Result<StatusResponse> {
        let response: StatusResponse = self.invoke(request).await?;
        if !response.success {
            let message = response
                .error
                .clone()
                .unwrap_or_else(|| format!("worker reported a {} failure", request.operation.as_str()));
            return Err(worker_failure(&message));
        }
        Ok(response)
    }

    async fn invoke<R: DeserializeOwned>(&self, request: &WorkerRequest) -> Result<R> {
        let operation = request.operation;
        let timeout = self.timeouts.for_operation(operation);

        let payload = ScratchFile::reserve(&self.scratch_dir, "sftp-worker", "json").await?;
        payload.write_private(&serde_json::to_vec(request)?).await?;

        debug!(
            operation = operation.as_str(),
            host = %request.connection.host,
            path = %request.path,
            timeout_secs = timeout.as_secs(),
            "Invoking worker"
        );

        let outcome = self.runner.run(&self.command, payload.path(), timeout).await;
        drop(payload);

        let output = match outcome? {
            RunOutcome::Completed(output) => output,
            RunOutcome::TimedOut => {
                warn!(
                    operation = operation.as_str(),
                    host = %request.connection.host,
                    timeout_secs = timeout.as_secs(),
                    "Worker timed out and was killed"
                );
                return Err(Error::BridgeTimeout {
                    operation: operation.as_str().to_string(),
                    timeout_secs: timeout.as_secs(),
                });
            }
        };

        match parse_worker_output(&output.stdout) {
            Some(document) => serde_json::from_value(document)
                .map_err(|e| Error::Bridge(format!("unexpected worker response: {}", e))),
            None if !output.success() => {
                let stderr = output.stderr.trim();
                let raw = if stderr.is_empty() {
                    format!("worker exited with status {:?}", output.exit_code)
                } else {
                    stderr.to_string()
                };
                warn!(operation = operation.as_str(), exit_code = ?output.exit_code, "Worker failed");
                Err(Error::Bridge(translate_worker_error(&raw)))
            }
            None => Err(Error::Bridge("worker produced no JSON output".to_string())),
        }
    }
}
