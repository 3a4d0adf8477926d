//! The storage backend: connection lifecycle and the public batch operations.
//!
//! Every operation takes a `PathArg`, normalizes it, runs the matching
//! single-path operation for each item in order and returns the
//! `{Successful, Failed}` envelope. Only an unusable argument or an
//! uninitialized connection fails the call as a whole.

use std::mem;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::args::{PathArg, RemotePath};
use crate::batch::BatchResult;
use crate::checksums::ChecksumAlgorithm;
use crate::config::StorageConfig;
use crate::error::{EngineError, ItemResult, RemoteError};
use crate::fs_store::FsStorage;
use crate::metadata::Metadata;
use crate::model::{DirectoryListing, DirectoryStats, TransferOutcome};
use crate::progress::TransferObserver;
use crate::remote::RemoteStorage;

enum Connection<S> {
    Ready(S),
    Unavailable(String),
    Released,
}

/// A storage backend bound to one storage connection.
///
/// The connection is opened when the backend is built and released exactly
/// once, by `close` or when the backend is dropped.
pub struct StorageBackend<S: RemoteStorage> {
    config: StorageConfig,
    connection: Connection<S>,
    observer: Option<Box<dyn TransferObserver>>,
}

/// Borrowed view of a ready backend, valid for one call.
///
/// The single-path file and directory operations live here.
pub struct Session<'a, S: RemoteStorage> {
    pub(crate) storage: &'a S,
    pub(crate) checksum: Option<ChecksumAlgorithm>,
    pub(crate) observer: Option<&'a dyn TransferObserver>,
}

impl<S: RemoteStorage> StorageBackend<S> {
    /// Wrap an already open storage handle.
    pub fn new(config: StorageConfig, storage: S) -> Self {
        Self {
            config,
            connection: Connection::Ready(storage),
            observer: None,
        }
    }

    /// Open the storage with `open`.
    ///
    /// A failed open still yields a backend; every call on it then returns
    /// `EngineError::NotInitialized` with the open failure as reason.
    pub fn connect<F>(config: StorageConfig, open: F) -> Self
    where
        F: FnOnce(&StorageConfig) -> Result<S, RemoteError>,
    {
        let connection = match config.validate() {
            Err(e) => Connection::Unavailable(e.to_string()),
            Ok(()) => match open(&config) {
                Ok(storage) => Connection::Ready(storage),
                Err(e) => {
                    error!(host = %config.host, port = config.port, error = %e, "failed to open storage connection");
                    Connection::Unavailable(e.to_string())
                }
            },
        };
        Self {
            config,
            connection,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: impl TransferObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.connection, Connection::Ready(_))
    }

    /// A session over the open connection.
    pub fn session(&self) -> Result<Session<'_, S>, EngineError> {
        match &self.connection {
            Connection::Ready(storage) => Ok(Session {
                storage,
                checksum: self.config.checksum,
                observer: self.observer.as_deref(),
            }),
            Connection::Unavailable(reason) => Err(EngineError::NotInitialized {
                reason: reason.clone(),
            }),
            Connection::Released => Err(EngineError::NotInitialized {
                reason: "connection already released".to_string(),
            }),
        }
    }

    /// Release the connection and report whether that succeeded.
    pub fn close(mut self) -> Result<(), EngineError> {
        self.release_connection().map_err(EngineError::Release)
    }

    fn release_connection(&mut self) -> Result<(), RemoteError> {
        match mem::replace(&mut self.connection, Connection::Released) {
            Connection::Ready(mut storage) => {
                debug!(host = %self.config.host, "releasing storage connection");
                storage.release()
            }
            Connection::Unavailable(_) | Connection::Released => Ok(()),
        }
    }

    fn each_path<V, F>(&self, op: &'static str, paths: impl Into<PathArg>, f: F) -> Result<BatchResult<V>, EngineError>
    where
        F: Fn(&Session<'_, S>, &str) -> ItemResult<V>,
    {
        let paths = paths.into().into_paths()?;
        let session = self.session()?;
        debug!(op, count = paths.len(), "processing paths");
        Ok(BatchResult::collect(paths, RemotePath::clone, |path| f(&session, path)))
    }

    fn each_pair<V, F>(&self, op: &'static str, pairs: impl Into<PathArg>, f: F) -> Result<BatchResult<V>, EngineError>
    where
        F: Fn(&Session<'_, S>, &Path, &str) -> ItemResult<V>,
    {
        let pairs = pairs.into().into_mapping()?;
        let session = self.session()?;
        debug!(op, count = pairs.len(), "processing destination/source pairs");
        Ok(BatchResult::collect(
            pairs,
            |(dest, _)| dest.clone(),
            |(dest, src)| f(&session, src, dest),
        ))
    }

    // ---- files ----

    pub fn exists(&self, paths: impl Into<PathArg>) -> Result<BatchResult<bool>, EngineError> {
        self.each_path("exists", paths, |s, p| s.exists(p))
    }

    pub fn is_file(&self, paths: impl Into<PathArg>) -> Result<BatchResult<bool>, EngineError> {
        self.each_path("isFile", paths, |s, p| s.is_file(p))
    }

    pub fn get_file_size(&self, paths: impl Into<PathArg>) -> Result<BatchResult<u64>, EngineError> {
        self.each_path("getFileSize", paths, |s, p| s.size(p))
    }

    pub fn get_file_metadata(&self, paths: impl Into<PathArg>) -> Result<BatchResult<Metadata>, EngineError> {
        self.each_path("getFileMetadata", paths, |s, p| s.file_metadata(p))
    }

    /// Remove files. A path that does not exist counts as removed.
    pub fn remove_file(&self, paths: impl Into<PathArg>) -> Result<BatchResult<bool>, EngineError> {
        self.each_path("removeFile", paths, |s, p| s.remove_file(p))
    }

    /// Download files into `local_dir` (default: the working directory),
    /// each under its remote base name.
    pub fn get_file(
        &self,
        paths: impl Into<PathArg>,
        local_dir: Option<&Path>,
    ) -> Result<BatchResult<u64>, EngineError> {
        let dir = local_dir.unwrap_or_else(|| Path::new("."));
        self.each_path("getFile", paths, |s, p| {
            let target = local_target(dir, p)?;
            s.download(p, &target)
        })
    }

    /// Upload files given as `{ destination: local source }`.
    pub fn put_file(&self, pairs: impl Into<PathArg>) -> Result<BatchResult<u64>, EngineError> {
        let pairs = pairs.into().into_mapping()?;
        let session = self.session()?;
        debug!(count = pairs.len(), "putFile");
        Ok(session.put_files(&pairs))
    }

    // ---- directories ----

    pub fn is_directory(&self, paths: impl Into<PathArg>) -> Result<BatchResult<bool>, EngineError> {
        self.each_path("isDirectory", paths, |s, p| s.is_directory(p))
    }

    /// Create directories, including missing parents.
    pub fn create_directory(&self, paths: impl Into<PathArg>) -> Result<BatchResult<bool>, EngineError> {
        self.each_path("createDirectory", paths, |s, p| s.create_directory(p).map(|()| true))
    }

    /// Non-recursive listing of each directory.
    pub fn list_directory(&self, paths: impl Into<PathArg>) -> Result<BatchResult<DirectoryListing>, EngineError> {
        self.each_path("listDirectory", paths, |s, p| s.list_directory(p, false))
    }

    pub fn get_directory_metadata(&self, paths: impl Into<PathArg>) -> Result<BatchResult<Metadata>, EngineError> {
        self.each_path("getDirectoryMetadata", paths, |s, p| s.directory_metadata(p))
    }

    pub fn get_directory_size(
        &self,
        paths: impl Into<PathArg>,
        recursive: bool,
    ) -> Result<BatchResult<DirectoryStats>, EngineError> {
        self.each_path("getDirectorySize", paths, |s, p| s.directory_size(p, recursive))
    }

    /// Upload local directory trees given as `{ destination: local directory }`.
    pub fn put_directory(&self, pairs: impl Into<PathArg>) -> Result<BatchResult<TransferOutcome>, EngineError> {
        self.each_pair("putDirectory", pairs, |s, src, dest| s.put_directory(src, dest))
    }

    /// Download remote directory trees into `local_dir` (default: the working
    /// directory), each under its remote base name.
    pub fn get_directory(
        &self,
        paths: impl Into<PathArg>,
        local_dir: Option<&Path>,
    ) -> Result<BatchResult<TransferOutcome>, EngineError> {
        let dir = local_dir.unwrap_or_else(|| Path::new("."));
        self.each_path("getDirectory", paths, |s, p| {
            let target = local_target(dir, p)?;
            s.get_directory(p, &target)
        })
    }

    pub fn remove_directory(
        &self,
        paths: impl Into<PathArg>,
        recursive: bool,
    ) -> Result<BatchResult<TransferOutcome>, EngineError> {
        self.each_path("removeDirectory", paths, |s, p| s.remove_directory(p, recursive))
    }

    // ---- offline staging: not offered by disk-only storage ----

    pub fn prestage_file(&self, _paths: impl Into<PathArg>) -> Result<BatchResult<bool>, EngineError> {
        unsupported("prestageFile")
    }

    pub fn prestage_file_status(&self, _paths: impl Into<PathArg>) -> Result<BatchResult<bool>, EngineError> {
        unsupported("prestageFileStatus")
    }

    pub fn pin_file(&self, _paths: impl Into<PathArg>) -> Result<BatchResult<bool>, EngineError> {
        unsupported("pinFile")
    }

    pub fn release_file(&self, _paths: impl Into<PathArg>) -> Result<BatchResult<bool>, EngineError> {
        unsupported("releaseFile")
    }
}

impl StorageBackend<FsStorage> {
    /// Backend over a locally mounted storage rooted at `config.base_path`.
    pub fn open_fs(config: StorageConfig) -> Self {
        Self::connect(config, FsStorage::open)
    }
}

impl<S: RemoteStorage> Drop for StorageBackend<S> {
    fn drop(&mut self) {
        if let Err(e) = self.release_connection() {
            warn!(error = %e, "failed to release storage connection");
        }
    }
}

fn unsupported<V>(operation: &'static str) -> Result<V, EngineError> {
    error!(operation, "operation not supported");
    Err(EngineError::Unsupported { operation })
}

/// `<dir>/<base name of remote>`.
fn local_target(dir: &Path, remote: &str) -> ItemResult<PathBuf> {
    match remote.trim_end_matches('/').rsplit('/').next() {
        Some(name) if !name.is_empty() && !name.contains(':') && name != ".." && name != "." => {
            Ok(dir.join(name))
        }
        _ => Err(RemoteError::InvalidPath {
            path: remote.to_string(),
            reason: "path has no base name".to_string(),
        }
        .into()),
    }
}
