//! The primitive capability a storage system has to offer the engine.
//!
//! Implementations wrap one connection/context to the storage. All calls are
//! blocking and made from a single thread at a time; the engine never shares
//! a storage handle between backends.

use std::path::Path;

use crate::checksums::{ChecksumAlgorithm, ChecksumValue};
use crate::error::RemoteError;
use crate::model::StatRecord;

pub trait RemoteStorage: Send {
    /// Whether anything exists at `path`.
    fn exists(&self, path: &str) -> Result<bool, RemoteError>;

    /// Stat the entry at `path` itself.
    ///
    /// A missing path is `RemoteError::NotFound`.
    fn stat(&self, path: &str) -> Result<StatRecord, RemoteError>;

    /// Entries below the directory at `path` (all descendants when `recursive`).
    fn list(&self, path: &str, recursive: bool) -> Result<Vec<StatRecord>, RemoteError>;

    /// Copy a local file onto the storage.
    fn copy_in(&self, local: &Path, remote: &str) -> Result<(), RemoteError>;

    /// Copy a remote file, or a whole remote directory tree, to a local path.
    fn copy_out(&self, remote: &str, local: &Path) -> Result<(), RemoteError>;

    /// Remove `path` and everything below it.
    fn remove(&self, path: &str) -> Result<(), RemoteError>;

    /// Create a directory, including missing parents.
    fn mkdir(&self, path: &str) -> Result<(), RemoteError>;

    /// Checksum of a remote file, if the storage can provide one.
    fn checksum(
        &self,
        _path: &str,
        _algorithm: ChecksumAlgorithm,
    ) -> Result<Option<ChecksumValue>, RemoteError> {
        Ok(None)
    }

    /// Release the underlying connection. Called exactly once by the owner.
    fn release(&mut self) -> Result<(), RemoteError> {
        Ok(())
    }
}
