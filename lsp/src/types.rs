//! Configuration and lifecycle types consumed by the server.
//!
//! These are deserialized from the `[lsp]` table of the user's config file by
//! `epsilon-config`; every field has a default so an absent table is valid.

use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Source tag attached to every published diagnostic.
pub const DEFAULT_SOURCE: &str = "epsilon-frontend";

/// File extension given to snapshot artifacts.
pub const DEFAULT_SNAPSHOT_EXTENSION: &str = "epsilon";

const DEFAULT_ANALYZER_TIMEOUT_MS: u64 = 30_000;

const fn default_true() -> bool {
    true
}

fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}

fn default_snapshot_extension() -> String {
    DEFAULT_SNAPSHOT_EXTENSION.to_string()
}

/// `<install root>/frontend/bin`, where the install root is the parent of the
/// directory holding the server binary. Falls back to a working-directory
/// relative path when the binary location is unknown.
fn default_classpath() -> String {
    env::current_exe()
        .ok()
        .and_then(|exe| classpath_for_exe(&exe))
        .map_or_else(
            || "frontend/bin".to_string(),
            |cp| cp.to_string_lossy().into_owned(),
        )
}

fn classpath_for_exe(exe: &Path) -> Option<PathBuf> {
    let root = exe.parent()?.parent()?;
    Some(root.join("frontend").join("bin"))
}

/// Configuration for the language server.
#[derive(Debug, Clone, Deserialize)]
pub struct LspConfig {
    /// Diagnostic source tag. Default: "epsilon-frontend".
    #[serde(default = "default_source")]
    pub source: String,
    /// Directory that receives snapshot artifacts. Default: `<temp>/epsilon-lsp`.
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
    /// Extension for snapshot artifacts, without the dot. Default: "epsilon".
    #[serde(default = "default_snapshot_extension")]
    pub snapshot_extension: String,
    /// Narrow each diagnostic to the token at its start position when the
    /// document text allows it. Default: true.
    #[serde(default = "default_true")]
    pub precise_spans: bool,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
}

impl Default for LspConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            snapshot_dir: None,
            snapshot_extension: default_snapshot_extension(),
            precise_spans: true,
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl LspConfig {
    /// Resolved snapshot directory.
    #[must_use]
    pub fn snapshot_dir(&self) -> PathBuf {
        self.snapshot_dir
            .clone()
            .unwrap_or_else(|| env::temp_dir().join("epsilon-lsp"))
    }
}

/// How to invoke the compiler front end in check-only mode.
///
/// The snapshot path is appended after `args`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    /// Executable (e.g. "java"). Resolved through `PATH` unless it contains a separator.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Kill the analyzer after this many milliseconds. `0` disables the limit.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            command: "java".to_string(),
            args: vec![
                "-cp".to_string(),
                default_classpath(),
                "com.epsilon.frontend.Main".to_string(),
                "--check".to_string(),
            ],
            timeout_ms: None,
        }
    }
}

impl AnalyzerConfig {
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        match self.timeout_ms {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => Some(Duration::from_millis(DEFAULT_ANALYZER_TIMEOUT_MS)),
        }
    }
}

/// Why the server loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStopReason {
    /// `exit` after a `shutdown` request.
    Exited,
    /// `exit` without a preceding `shutdown`.
    ExitedWithoutShutdown,
    /// The client closed the input stream.
    InputClosed,
}

impl ServerStopReason {
    /// Process exit code expected by LSP clients.
    #[must_use]
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Exited => 0,
            Self::ExitedWithoutShutdown | Self::InputClosed => 1,
        }
    }
}
