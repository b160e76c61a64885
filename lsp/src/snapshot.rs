//! Snapshot materializer: hands a document's text to an out-of-process analyzer.
//!
//! Each snapshot is an exclusively-created file named
//! `diag_<unix-millis>_<random>.<ext>` inside the snapshot directory. The
//! [`SnapshotHandle`] owns the file; it is removed by [`SnapshotHandle::discard`]
//! or, failing that, when the handle is dropped.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::{Builder, TempPath};
use thiserror::Error;

const NAME_PREFIX: &str = "diag_";
const RANDOM_CHARS: usize = 8;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("cannot create snapshot directory {}: {source}", dir.display())]
    CreateDir {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write snapshot in {}: {source}", dir.display())]
    Write {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct SnapshotMaterializer {
    dir: PathBuf,
    suffix: String,
}

impl SnapshotMaterializer {
    /// `extension` is given without the leading dot; empty means no extension.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, extension: &str) -> Self {
        let suffix = if extension.is_empty() {
            String::new()
        } else {
            format!(".{}", extension.trim_start_matches('.'))
        };
        Self {
            dir: dir.into(),
            suffix,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `text` to a fresh, uniquely named artifact.
    ///
    /// On any failure nothing is left behind on disk.
    pub fn materialize(&self, text: &str) -> Result<SnapshotHandle, SnapshotError> {
        fs::create_dir_all(&self.dir).map_err(|source| SnapshotError::CreateDir {
            dir: self.dir.clone(),
            source,
        })?;

        let prefix = format!(
            "{NAME_PREFIX}{}_",
            Utc::now().timestamp_millis()
        );
        let write_err = |source| SnapshotError::Write {
            dir: self.dir.clone(),
            source,
        };

        let mut file = Builder::new()
            .prefix(&prefix)
            .suffix(&self.suffix)
            .rand_bytes(RANDOM_CHARS)
            .tempfile_in(&self.dir)
            .map_err(write_err)?;
        file.write_all(text.as_bytes()).map_err(write_err)?;
        file.flush().map_err(write_err)?;

        // Closing our handle lets the analyzer open the file on every platform.
        Ok(SnapshotHandle {
            path: file.into_temp_path(),
        })
    }
}

/// Owns one materialized snapshot until it is discarded.
#[derive(Debug)]
pub struct SnapshotHandle {
    path: TempPath,
}

impl SnapshotHandle {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the artifact, reporting failure instead of ignoring it.
    pub fn discard(self) -> io::Result<()> {
        self.path.close()
    }
}
