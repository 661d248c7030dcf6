//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The advisory lock guarding the backing file could not be acquired.
    #[error("failed to lock {}: {source}", path.display())]
    Locked {
        /// Path of the lock file.
        path: PathBuf,
        /// The underlying lock error.
        source: io::Error,
    },

    /// A line handed to the backend contains a line terminator.
    #[error("line contains a line terminator")]
    InvalidLine,
}
