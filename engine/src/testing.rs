//! Test doubles: a fault-injecting storage and a recording observer.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::checksums::{ChecksumAlgorithm, ChecksumValue};
use crate::config::StorageConfig;
use crate::error::RemoteError;
use crate::fs_store::FsStorage;
use crate::model::{Direction, StatRecord};
use crate::progress::TransferObserver;
use crate::remote::RemoteStorage;
use crate::StorageBackend;

#[derive(Debug, Clone, Default)]
pub struct Faults {
    /// Truncate every uploaded file to half its size
    pub truncate_copy_in: bool,
    /// Overwrite every uploaded file with same-length garbage
    pub scramble_copy_in: bool,
    /// Fail every upload without writing anything
    pub fail_copy_in: bool,
    /// Append one byte to every downloaded file
    pub pad_copy_out: bool,
    /// Fail every remove with a generic I/O error
    pub fail_remove: bool,
    /// Fail every bulk (directory) download
    pub fail_tree_copy_out: bool,
    /// Checksum algorithm configured on the backend
    pub checksum: Option<ChecksumAlgorithm>,
}

pub struct FaultyStorage {
    inner: FsStorage,
    faults: Faults,
}

fn injected(path: &str, what: &str) -> RemoteError {
    RemoteError::Io {
        path: path.to_string(),
        message: format!("injected {what} failure"),
    }
}

impl RemoteStorage for FaultyStorage {
    fn exists(&self, path: &str) -> Result<bool, RemoteError> {
        self.inner.exists(path)
    }

    fn stat(&self, path: &str) -> Result<StatRecord, RemoteError> {
        self.inner.stat(path)
    }

    fn list(&self, path: &str, recursive: bool) -> Result<Vec<StatRecord>, RemoteError> {
        self.inner.list(path, recursive)
    }

    fn copy_in(&self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        if self.faults.fail_copy_in {
            return Err(injected(remote, "copy-in"));
        }
        self.inner.copy_in(local, remote)?;

        let target = self.inner.resolve(remote)?;
        let len = fs::metadata(&target).map(|m| m.len()).unwrap_or(0);
        if self.faults.truncate_copy_in {
            let file = fs::OpenOptions::new().write(true).open(&target).expect("open upload");
            file.set_len(len / 2).expect("truncate upload");
        }
        if self.faults.scramble_copy_in {
            let garbage = vec![b'#'; usize::try_from(len).expect("length fits")];
            fs::write(&target, garbage).expect("scramble upload");
        }
        Ok(())
    }

    fn copy_out(&self, remote: &str, local: &Path) -> Result<(), RemoteError> {
        let is_dir = self.inner.resolve(remote)?.is_dir();
        if is_dir && self.faults.fail_tree_copy_out {
            return Err(injected(remote, "bulk copy-out"));
        }
        self.inner.copy_out(remote, local)?;
        if self.faults.pad_copy_out && !is_dir {
            let mut file = fs::OpenOptions::new().append(true).open(local).expect("open download");
            file.write_all(b"!").expect("pad download");
        }
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), RemoteError> {
        if self.faults.fail_remove {
            return Err(injected(path, "remove"));
        }
        self.inner.remove(path)
    }

    fn mkdir(&self, path: &str) -> Result<(), RemoteError> {
        self.inner.mkdir(path)
    }

    fn checksum(
        &self,
        path: &str,
        algorithm: ChecksumAlgorithm,
    ) -> Result<Option<ChecksumValue>, RemoteError> {
        self.inner.checksum(path, algorithm)
    }
}

/// A backend over a fresh storage directory plus a fresh local scratch directory.
pub fn faulty_backend(
    faults: Faults,
) -> (tempfile::TempDir, tempfile::TempDir, StorageBackend<FaultyStorage>) {
    let store = tempfile::tempdir().expect("Failed to create storage dir");
    let local = tempfile::tempdir().expect("Failed to create local dir");
    let mut config = StorageConfig::new(store.path().to_string_lossy());
    config.checksum = faults.checksum;
    let backend = StorageBackend::connect(config, |config| {
        Ok(FaultyStorage {
            inner: FsStorage::open(config)?,
            faults,
        })
    });
    (store, local, backend)
}

/// Records observer callbacks as short strings.
#[derive(Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.events)
    }
}

impl TransferObserver for RecordingObserver {
    fn on_file_started(&self, direction: Direction, remote: &str, _local: &Path) {
        self.events
            .lock()
            .expect("lock")
            .push(format!("start {direction} {remote}"));
    }

    fn on_file_completed(&self, direction: Direction, remote: &str, outcome: Result<u64, &str>) {
        let line = match outcome {
            Ok(size) => format!("done {direction} {remote} {size}"),
            Err(_) => format!("fail {direction} {remote}"),
        };
        self.events.lock().expect("lock").push(line);
    }
}
