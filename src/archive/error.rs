//! Error types for archive building and reading.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while writing or reading a chapter archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// File system error (create, write, rename, remove).
    #[error("IO error at {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Zip-level error (container format, entry write).
    #[error("zip error at {path}: {source}")]
    Zip {
        /// The archive path where the error occurred.
        path: PathBuf,
        /// The underlying zip error.
        #[source]
        source: zip::result::ZipError,
    },

    /// The blocking archive task was cancelled or panicked.
    #[error("archive task failed for {path}")]
    Task {
        /// The archive path being processed.
        path: PathBuf,
    },
}

impl ArchiveError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a zip error.
    pub fn zip(path: impl Into<PathBuf>, source: zip::result::ZipError) -> Self {
        Self::Zip {
            path: path.into(),
            source,
        }
    }

    /// Creates a task failure error.
    pub fn task(path: impl Into<PathBuf>) -> Self {
        Self::Task { path: path.into() }
    }
}
