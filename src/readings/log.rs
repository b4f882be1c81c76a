//! Per-day reading log
//!
//! Layout on disk:
//!
//! ```text
//! <root>/<YYYY-MM-DD>/<kind>.log
//! ```
//!
//! Each line is `[<RFC 3339 timestamp>] <value>`. Files are only ever
//! appended to; a new file starts when the UTC date changes.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::types::ReadingKind;

/// Append-only, date-partitioned sink for readings
#[derive(Debug, Clone)]
pub struct ReadingLog {
    root: PathBuf,
}

/// Errors writing the reading log
#[derive(Error, Debug)]
pub enum ReadingLogError {
    #[error("Failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReadingLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding readings of `kind` for `date`
    pub fn path_for(&self, date: NaiveDate, kind: ReadingKind) -> PathBuf {
        self.root
            .join(date.format("%Y-%m-%d").to_string())
            .join(format!("{}.log", kind))
    }

    /// Append a reading stamped with `at`.
    ///
    /// Failures are logged and swallowed; returns whether the line was written.
    pub async fn append_at(&self, kind: ReadingKind, value: f64, at: DateTime<Utc>) -> bool {
        match self.try_append_at(kind, value, at).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(kind = %kind, value, error = %e, "Reading log write failed");
                false
            }
        }
    }

    /// Append a reading stamped with `at`, creating the day's directory if needed
    pub async fn try_append_at(
        &self,
        kind: ReadingKind,
        value: f64,
        at: DateTime<Utc>,
    ) -> Result<PathBuf, ReadingLogError> {
        let path = self.path_for(at.date_naive(), kind);
        let io_err = |source| ReadingLogError::Io {
            path: path.clone(),
            source,
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await.map_err(io_err)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(io_err)?;

        file.write_all(format_line(value, at).as_bytes())
            .await
            .map_err(io_err)?;
        file.flush().await.map_err(io_err)?;

        tracing::trace!(path = ?path, value, "Reading logged");
        Ok(path)
    }
}

/// `[2024-05-01T08:30:00.000Z] 23.5\n`
pub(crate) fn format_line(value: f64, at: DateTime<Utc>) -> String {
    format!(
        "[{}] {}\n",
        at.to_rfc3339_opts(SecondsFormat::Millis, true),
        value
    )
}
