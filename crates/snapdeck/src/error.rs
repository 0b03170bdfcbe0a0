//! Error types for the snapshot index

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Snapshot index error type
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Pattern error: {0}")]
    Pattern(String),

    #[error("Glob error: {0}")]
    Glob(#[from] glob::GlobError),

    #[error("Malformed snapshot file {} at byte {offset}: {message}", path.display())]
    SnapshotParse {
        path: PathBuf,
        offset: usize,
        message: String,
    },

    #[error("Folder tree invariant violated: {0}")]
    TreeInvariant(String),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IndexError {
    /// Wrap an IO error with the path that produced it.
    pub fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        IndexError::Read {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, IndexError>;
