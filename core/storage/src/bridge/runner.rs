//! Child process launching for the bridge.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::warn;

use stowage_common::{Error, Result};

use super::WorkerCommand;

/// Captured result of a finished worker.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Exit code, `None` when terminated by a signal.
    pub exit_code: Option<i32>,
    /// Standard output.
    pub stdout: String,
    /// Standard error, used only for diagnostics.
    pub stderr: String,
}

impl ProcessOutput {
    /// Whether the worker exited with status zero.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// How a worker invocation ended.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The worker exited on its own.
    Completed(ProcessOutput),
    /// The deadline passed; the worker has been killed and reaped.
    TimedOut,
}

/// Launches a worker for one payload file.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command` with `payload` appended as the last argument.
    ///
    /// # Errors
    /// - Worker could not be launched
    /// - Reading its output failed
    async fn run(&self, command: &WorkerCommand, payload: &Path, timeout: Duration)
        -> Result<RunOutcome>;
}

/// Runs workers as tokio child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        command: &WorkerCommand,
        payload: &Path,
        timeout: Duration,
    ) -> Result<RunOutcome> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .arg(payload)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Bridge(format!("failed to launch worker '{}': {}", command.program, e))
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Bridge("worker stdout unavailable".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Bridge("worker stderr unavailable".to_string()))?;

        let collect = async {
            let mut out = Vec::new();
            let mut err = Vec::new();
            let (status, _, _) = tokio::try_join!(
                child.wait(),
                stdout.read_to_end(&mut out),
                stderr.read_to_end(&mut err)
            )?;
            Ok::<_, std::io::Error>((status, out, err))
        };
        let outcome = tokio::time::timeout(timeout, collect).await;

        match outcome {
            Ok(Ok((status, out, err))) => Ok(RunOutcome::Completed(ProcessOutput {
                exit_code: status.code(),
                stdout: String::from_utf8_lossy(&out).into_owned(),
                stderr: String::from_utf8_lossy(&err).into_owned(),
            })),
            Ok(Err(e)) => Err(Error::Io(e)),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(program = %command.program, error = %e, "Failed to kill timed-out worker");
                }
                Ok(RunOutcome::TimedOut)
            }
        }
    }
}
