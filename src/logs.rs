//! Per-invocation log files.
//!
//! Each invocation gets a fresh, timestamp-named file under the logs
//! directory. Lines are appended verbatim and flushed immediately so a
//! reader mid-run (or after a crash) sees every line produced so far.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;

/// Error type for log sink operations.
#[derive(thiserror::Error, Debug)]
pub enum LogError {
    /// The logs directory could not be created.
    #[error("Failed to create logs directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The log file could not be created.
    #[error("Failed to create log file {path}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Returns the default logs directory.
///
/// This is `<data dir>/rcman/logs`, e.g. `~/.local/share/rcman/logs` on
/// Unix systems.
#[must_use]
pub fn default_logs_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rcman")
        .join("logs")
}

/// An open per-invocation log file.
#[derive(Debug)]
pub struct LogSink {
    file: File,
    path: PathBuf,
}

impl LogSink {
    /// Create a uniquely named log file under `dir`, creating the
    /// directory first if needed.
    ///
    /// # Errors
    ///
    /// Returns `LogError` if the directory or file cannot be created; the
    /// caller treats this as a launch-class failure.
    pub async fn create(dir: &Path) -> Result<Self, LogError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| LogError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;

        let stamp = chrono::Utc::now().timestamp_millis();
        let mut path = dir.join(format!("robocopy_{stamp}.log"));
        let mut seq = 1;
        while path.exists() {
            path = dir.join(format!("robocopy_{stamp}_{seq}.log"));
            seq += 1;
        }
        let file = File::create(&path)
            .await
            .map_err(|source| LogError::Create {
                path: path.clone(),
                source,
            })?;

        Ok(Self { file, path })
    }

    /// Open a sink appending to an explicit file, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns `LogError::Create` if the file cannot be opened.
    pub async fn at_path(path: impl Into<PathBuf>) -> Result<Self, LogError> {
        let path = path.into();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| LogError::Create {
                path: path.clone(),
                source,
            })?;
        Ok(Self { file, path })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a line verbatim and flush immediately.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error; the caller reports it and keeps
    /// draining.
    pub async fn append_line(&mut self, line: &str) -> std::io::Result<()> {
        self.file.write_all(line.as_bytes()).await?;
        self.file.flush().await
    }

    /// Close and remove the file, for launch attempts that never ran.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be removed.
    pub async fn discard(self) -> std::io::Result<()> {
        drop(self.file);
        tokio::fs::remove_file(&self.path).await
    }
}
