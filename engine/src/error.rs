//! Error types for the storage engine.
//!
//! There are three layers:
//! - `RemoteError`: what a `RemoteStorage` primitive reports.
//! - `ItemError`: a failure of one path within a batch. These never abort the
//!   call; they are rendered into the `Failed` half of a `BatchResult`.
//! - `EngineError`: call-level errors that prevent any per-path work.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by the remote storage primitives.
///
/// "Not found" is its own variant so callers never have to inspect message
/// text to tell a missing path from a real I/O problem.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The path does not exist on the storage
    #[error("path does not exist: {path}")]
    NotFound { path: String },

    /// The path cannot be mapped onto the storage namespace
    #[error("invalid storage path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Any other failure of the underlying storage system
    #[error("storage I/O error on {path}: {message}")]
    Io { path: String, message: String },
}

impl RemoteError {
    /// Build an `Io` variant, mapping `NotFound` I/O errors onto `NotFound`.
    pub fn from_io(path: impl Into<String>, err: &io::Error) -> Self {
        let path = path.into();
        if err.kind() == io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io {
                path,
                message: err.to_string(),
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// A failure of a single path inside a batch operation.
#[derive(Debug, Error)]
pub enum ItemError {
    /// The remote primitive failed
    #[error("remote I/O error: {0}")]
    Remote(#[from] RemoteError),

    /// The operation needs a file but the path is something else
    #[error("path is not a file: {path}")]
    NotAFile { path: String },

    /// The operation needs a directory but the path is something else
    #[error("path is not a directory: {path}")]
    NotADirectory { path: String },

    /// Post-transfer size comparison failed; the partial artifact was removed
    #[error(
        "size mismatch for {path} (source size: {expected}, destination size: {}); removed destination",
        actual.map_or_else(|| "unknown".to_string(), |size| size.to_string())
    )]
    SizeMismatch {
        path: String,
        expected: u64,
        actual: Option<u64>,
    },

    /// Post-transfer checksum comparison failed; the partial artifact was removed
    #[error("checksum mismatch for {path} (source: {expected}, destination: {actual}); removed destination")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Removing a partial artifact after a failed transfer did not succeed
    #[error("failed to remove destination {path} after failed transfer: {source}")]
    CleanupFailed {
        path: String,
        #[source]
        source: RemoteError,
    },

    /// Zero-length upload source
    #[error("source file is empty: {}", path.display())]
    EmptySource { path: PathBuf },

    /// Local source is missing or not a regular file
    #[error("invalid local source {}: {reason}", path.display())]
    InvalidSource { path: PathBuf, reason: String },

    /// Local filesystem failure on the caller's side of a transfer
    #[error("local I/O error on {}: {source}", path.display())]
    Local {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ItemError {
    pub(crate) fn local(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Local {
            path: path.into(),
            source,
        }
    }
}

/// Errors that abort a whole call before any path is processed.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The call argument does not have a shape the operation accepts
    #[error("argument format error: {reason}")]
    ArgumentFormat { reason: String },

    /// The storage connection could not be established when the backend was built
    #[error("storage backend not initialized: {reason}")]
    NotInitialized { reason: String },

    /// Tape/offline staging operations are not offered by this backend
    #[error("{operation}: operation not supported by this storage backend")]
    Unsupported { operation: &'static str },

    /// Releasing the storage connection failed
    #[error("failed to release storage connection: {0}")]
    Release(#[source] RemoteError),
}

impl EngineError {
    pub(crate) fn argument(reason: impl Into<String>) -> Self {
        Self::ArgumentFormat {
            reason: reason.into(),
        }
    }
}

/// Result of a single-path operation.
pub type ItemResult<T> = std::result::Result<T, ItemError>;
