//! Analyzer invoker: runs the compiler front end in check-only mode.

use std::ffi::OsString;
use std::future::Future;
use std::{io, iter};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio::time;

use crate::types::AnalyzerConfig;

/// Captured result of one analyzer run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerOutput {
    /// Entire standard error stream, decoded lossily.
    pub stderr: String,
    /// Exit code, or `None` if the process was terminated by a signal.
    pub status: Option<i32>,
}

#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// The analyzer could not be launched at all (missing binary, permissions).
    #[error("analyzer `{command}` is unavailable: {reason}")]
    Unavailable { command: String, reason: String },
    #[error("analyzer `{command}` failed: {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("analyzer `{command}` timed out after {after:?}")]
    TimedOut { command: String, after: Duration },
}

/// Checks one snapshot file and reports what the analyzer printed.
///
/// A run that reports compile errors is a successful check; only failing to
/// run the analyzer is an error.
pub trait Analyzer: Send + Sync + 'static {
    fn check(
        &self,
        snapshot: &Path,
    ) -> impl Future<Output = Result<AnalyzerOutput, AnalyzerError>> + Send;
}

/// Runs the configured command as a child process.
#[derive(Debug, Clone)]
pub struct ProcessAnalyzer {
    config: AnalyzerConfig,
}

impl ProcessAnalyzer {
    #[must_use]
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Resolve the executable, re-checked per run so installing it later takes effect.
    fn resolve(&self) -> Result<PathBuf, AnalyzerError> {
        which::which(&self.config.command).map_err(|e| AnalyzerError::Unavailable {
            command: self.config.command.clone(),
            reason: e.to_string(),
        })
    }

    /// Full argument vector for `snapshot`, excluding the program.
    #[must_use]
    pub fn args_for(&self, snapshot: &Path) -> Vec<OsString> {
        self.config
            .args
            .iter()
            .map(Into::into)
            .chain(iter::once(snapshot.as_os_str().to_owned()))
            .collect()
    }

    async fn run(&self, snapshot: &Path) -> Result<AnalyzerOutput, AnalyzerError> {
        let program = self.resolve()?;
        let command = &self.config.command;

        let child = Command::new(&program)
            .args(self.args_for(snapshot))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                    AnalyzerError::Unavailable {
                        command: command.clone(),
                        reason: e.to_string(),
                    }
                }
                _ => AnalyzerError::Io {
                    command: command.clone(),
                    source: e,
                },
            })?;

        tracing::debug!(
            program = %program.display(),
            snapshot = %snapshot.display(),
            "Analyzer started"
        );

        let waited = child.wait_with_output();
        let output = match self.config.timeout() {
            // Dropping the timed-out future drops the child, which kills it.
            Some(limit) => time::timeout(limit, waited).await.map_err(|_| {
                AnalyzerError::TimedOut {
                    command: command.clone(),
                    after: limit,
                }
            })?,
            None => waited.await,
        }
        .map_err(|source| AnalyzerError::Io {
            command: command.clone(),
            source,
        })?;

        Ok(AnalyzerOutput {
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            status: output.status.code(),
        })
    }
}

impl Analyzer for ProcessAnalyzer {
    fn check(
        &self,
        snapshot: &Path,
    ) -> impl Future<Output = Result<AnalyzerOutput, AnalyzerError>> + Send {
        self.run(snapshot)
    }
}
