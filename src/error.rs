//! Crate-wide error type.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised during ingestion.
///
/// Per-file errors never escalate past the file that caused them; the
/// engine converts them into a `Failed` outcome and moves on. Only setup
/// errors (missing source directory, unusable cache file) abort a run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("source directory does not exist: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("cache file unusable: {0}")]
    CacheFile(String),

    #[error("cache verification failed after saving {}; backup retained{}",
        .path.display(),
        .backup.as_ref().map(|b| format!(" at {}", b.display())).unwrap_or_default())]
    CacheVerify {
        path: PathBuf,
        backup: Option<PathBuf>,
    },

    #[error("size mismatch between {} and {}", .src.display(), .dest.display())]
    SizeMismatch { src: PathBuf, dest: PathBuf },

    #[error("path is not a direct relative path: {0}")]
    InvalidPath(String),

    #[error("no free roll within {limit} attempts under {}", .bucket.display())]
    RollsExhausted { bucket: PathBuf, limit: u32 },
}

impl Error {
    /// Attach a path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
