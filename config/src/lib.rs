//! Configuration for the Epsilon language server.
//!
//! Read from `~/.epsilon/config.toml`, or from the file named by
//! `EPSILON_LSP_CONFIG`. A missing file means defaults.

use std::path::{Path, PathBuf};
use std::{env, fs, io};

use epsilon_lsp::LspConfig;
use serde::Deserialize;
use toml::de;
use thiserror::Error;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV_VAR: &str = "EPSILON_LSP_CONFIG";

#[derive(Debug, Default, Deserialize)]
pub struct EpsilonConfig {
    /// Language server settings.
    pub lsp: Option<LspConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

/// Expand `${VAR}` references from the environment.
///
/// Unset variables expand to nothing; an unclosed `${` is kept as written.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &rest[start + 2..start + 2 + end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &rest[start + 2 + end + 1..];
    }

    out.push_str(rest);
    out
}

impl EpsilonConfig {
    /// Load the config file, if there is one.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    /// Load from an explicit path. A file that does not exist yields `Ok(None)`.
    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).map_err(|source| {
            tracing::warn!("Failed to read config at {}: {source}", path.display());
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(source) => {
                tracing::warn!("Failed to parse config at {}: {source}", path.display());
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    /// Server settings with defaults filled in and `${VAR}` references expanded.
    #[must_use]
    pub fn lsp_config(&self) -> LspConfig {
        let mut config = self.lsp.clone().unwrap_or_default();
        config.analyzer.command = expand_env_vars(&config.analyzer.command);
        for arg in &mut config.analyzer.args {
            *arg = expand_env_vars(arg);
        }
        if let Some(dir) = config.snapshot_dir.take() {
            config.snapshot_dir = Some(PathBuf::from(expand_env_vars(&dir.to_string_lossy())));
        }
        config
    }
}

/// `$EPSILON_LSP_CONFIG` if set and non-empty, else `~/.epsilon/config.toml`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV_VAR).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".epsilon").join("config.toml"))
}
