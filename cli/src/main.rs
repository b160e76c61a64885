//! `epsilon-lsp` - language server entry point.
//!
//! Speaks LSP over stdin/stdout. stdout carries protocol frames only, so logs
//! go to `~/.epsilon/logs/epsilon-lsp.log` (or stderr when no log file can be
//! opened).

use std::{
    fs::{self, File, OpenOptions},
    io, iter,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Mutex,
};

use epsilon_config::EpsilonConfig;
use tokio::io::{stdin, stdout};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_NAME: &str = "epsilon-lsp.log";

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let mut skipped = Vec::new();
    let log_file = log_file_candidates()
        .into_iter()
        .find_map(|path| match open_append(&path) {
            Ok(file) => Some((path, file)),
            Err(e) => {
                skipped.push(format!("Cannot log to {}: {e}", path.display()));
                None
            }
        });

    let fmt_layer = fmt::layer().with_ansi(false);
    match log_file {
        Some((path, file)) => {
            tracing_subscriber::registry()
                .with(fmt_layer.with_writer(Mutex::new(file)))
                .with(env_filter)
                .init();
            tracing::info!(path = %path.display(), "Logging initialized");
        }
        // stderr is the operator channel; stdout belongs to the protocol.
        None => tracing_subscriber::registry()
            .with(fmt_layer.with_writer(io::stderr))
            .with(env_filter)
            .init(),
    }
    for reason in skipped {
        tracing::warn!("{reason}");
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// `~/.epsilon/logs/epsilon-lsp.log`, then the same path under the working directory.
fn log_file_candidates() -> Vec<PathBuf> {
    let relative = Path::new(".epsilon").join("logs").join(LOG_FILE_NAME);
    dirs::home_dir()
        .map(|home| home.join(&relative))
        .into_iter()
        .chain(iter::once(relative))
        .collect()
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config = match EpsilonConfig::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("{e}; using default settings");
            EpsilonConfig::default()
        }
    };
    let lsp = config.lsp_config();
    tracing::info!(
        analyzer = %lsp.analyzer.command,
        snapshot_dir = %lsp.snapshot_dir().display(),
        "Starting epsilon-lsp {}",
        env!("CARGO_PKG_VERSION")
    );

    match epsilon_lsp::serve(stdin(), stdout(), &lsp).await {
        Ok(reason) => ExitCode::from(reason.exit_code()),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("epsilon-lsp: {e:#}");
            ExitCode::FAILURE
        }
    }
}
