//! Error types for foldersync-sync.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from synchronization operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source file vanished between snapshot and copy. Never retried.
    #[error("source file missing during copy: {path}")]
    SourceMissing { path: PathBuf },

    /// Overwrite was not requested and the destination already exists.
    #[error("destination already exists: {path}")]
    DestinationExists { path: PathBuf },

    /// JSON serialization error (state store).
    #[error("state store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// `true` for the benign snapshot/copy race of a deleted source file.
    pub fn is_source_missing(&self) -> bool {
        matches!(self, SyncError::SourceMissing { .. })
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Convert a directory-walk failure, keeping the offending path.
pub(crate) fn walk_err(root: &std::path::Path, err: walkdir::Error) -> SyncError {
    let path = err
        .path()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| root.to_path_buf());
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
    SyncError::Io { path, source }
}
