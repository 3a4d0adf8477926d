//! Single-file operations: inspection, verified upload/download, removal.
//!
//! Transfers follow one protocol in both directions:
//! 1. determine the source size,
//! 2. remove whatever sits at the destination (the storage has no atomic
//!    overwrite),
//! 3. copy,
//! 4. compare the destination size (and checksum, when configured) with the
//!    source, removing the destination artifact on any mismatch.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, error, warn};

use crate::backend::Session;
use crate::checksums::compute_file_checksum;
use crate::error::{ItemError, ItemResult, RemoteError};
use crate::fs_ops;
use crate::metadata::Metadata;
use crate::model::{Direction, EntryKind};
use crate::remote::RemoteStorage;

impl<S: RemoteStorage> Session<'_, S> {
    pub fn exists(&self, path: &str) -> ItemResult<bool> {
        debug!(path, "checking existence");
        Ok(self.storage.exists(path)?)
    }

    /// Whether `path` is a file. A missing path is an error, not `false`.
    pub fn is_file(&self, path: &str) -> ItemResult<bool> {
        Ok(self.storage.stat(path)?.kind == EntryKind::File)
    }

    pub fn size(&self, path: &str) -> ItemResult<u64> {
        let stat = self.storage.stat(path)?;
        if stat.kind != EntryKind::File {
            return Err(ItemError::NotAFile {
                path: path.to_string(),
            });
        }
        Ok(stat.size)
    }

    /// Metadata of any entry.
    pub fn metadata(&self, path: &str) -> ItemResult<Metadata> {
        Ok(Metadata::from_stat(&self.storage.stat(path)?))
    }

    /// Metadata of an entry that must be a file.
    pub fn file_metadata(&self, path: &str) -> ItemResult<Metadata> {
        let metadata = self.metadata(path)?;
        if !metadata.is_file {
            return Err(ItemError::NotAFile {
                path: path.to_string(),
            });
        }
        Ok(metadata)
    }

    /// Remove a file. Already absent counts as removed.
    pub fn remove_file(&self, path: &str) -> ItemResult<bool> {
        self.remove_remote(path)?;
        Ok(true)
    }

    pub(crate) fn remove_remote(&self, path: &str) -> Result<(), RemoteError> {
        debug!(path, "removing");
        match self.storage.remove(path) {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(path, "already absent");
                Ok(())
            }
            // Some storages report a generic failure for missing paths.
            Err(e) => match self.storage.exists(path) {
                Ok(false) => Ok(()),
                _ => Err(e),
            },
        }
    }

    /// Copy `remote` to `local`, replacing any existing local file.
    ///
    /// # Returns
    /// The verified size in bytes
    pub fn download(&self, remote: &str, local: &Path) -> ItemResult<u64> {
        self.observed(Direction::Download, remote, local, || {
            self.download_verified(remote, local)
        })
    }

    /// Copy `local` to `remote`, replacing any existing remote file.
    ///
    /// # Returns
    /// The verified size in bytes
    pub fn upload(&self, local: &Path, remote: &str) -> ItemResult<u64> {
        self.observed(Direction::Upload, remote, local, || {
            self.upload_verified(local, remote)
        })
    }

    fn observed<F>(&self, direction: Direction, remote: &str, local: &Path, transfer: F) -> ItemResult<u64>
    where
        F: FnOnce() -> ItemResult<u64>,
    {
        if let Some(observer) = self.observer {
            observer.on_file_started(direction, remote, local);
        }
        let result = transfer();
        if let Some(observer) = self.observer {
            match &result {
                Ok(size) => observer.on_file_completed(direction, remote, Ok(*size)),
                Err(e) => observer.on_file_completed(direction, remote, Err(&e.to_string())),
            }
        }
        result
    }

    fn download_verified(&self, remote: &str, local: &Path) -> ItemResult<u64> {
        let expected = self.size(remote)?;

        match fs::symlink_metadata(local) {
            Ok(existing) if existing.is_dir() => {
                return Err(ItemError::local(
                    local,
                    io::Error::new(io::ErrorKind::AlreadyExists, "destination is a directory"),
                ));
            }
            Ok(_) => fs::remove_file(local).map_err(|e| ItemError::local(local, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(ItemError::local(local, e)),
        }
        fs_ops::ensure_parent_dir_exists(local).map_err(|e| ItemError::local(local, e))?;

        let copied = self
            .storage
            .copy_out(remote, local)
            .map_err(ItemError::from)
            .and_then(|()| self.verify_download(remote, local, expected));

        if let Err(e) = copied {
            error!(remote, local = %local.display(), error = %e, "download failed, removing local copy");
            if let Err(cleanup) = fs_ops::remove_local_file(local) {
                warn!(local = %local.display(), error = %cleanup, "failed to remove local copy");
            }
            return Err(e);
        }

        debug!(remote, local = %local.display(), size = expected, "downloaded");
        Ok(expected)
    }

    fn verify_download(&self, remote: &str, local: &Path, expected: u64) -> ItemResult<()> {
        let actual = fs::metadata(local).ok().map(|m| m.len());
        if actual != Some(expected) {
            return Err(ItemError::SizeMismatch {
                path: remote.to_string(),
                expected,
                actual,
            });
        }

        let Some(algorithm) = self.checksum else {
            return Ok(());
        };
        let Some(remote_sum) = self.storage.checksum(remote, algorithm)? else {
            return Ok(());
        };
        let local_sum = compute_file_checksum(local, algorithm).map_err(|e| ItemError::local(local, e))?;
        if !local_sum.matches(&remote_sum) {
            return Err(ItemError::ChecksumMismatch {
                path: remote.to_string(),
                expected: remote_sum.to_string(),
                actual: local_sum.to_string(),
            });
        }
        Ok(())
    }

    fn upload_verified(&self, local: &Path, remote: &str) -> ItemResult<u64> {
        let source_size = validate_source(local)?;

        if self.storage.exists(remote)? {
            debug!(remote, "destination exists, removing before upload");
            self.remove_remote(remote)?;
        }

        let copied = self
            .storage
            .copy_in(local, remote)
            .map_err(ItemError::from)
            .and_then(|()| self.verify_upload(local, remote, source_size));

        match copied {
            Ok(()) => {
                debug!(remote, size = source_size, "uploaded and verified");
                Ok(source_size)
            }
            Err(e) => {
                error!(remote, error = %e, "upload failed, removing destination");
                match self.remove_remote(remote) {
                    Ok(()) => Err(e),
                    Err(cleanup) => Err(ItemError::CleanupFailed {
                        path: remote.to_string(),
                        source: cleanup,
                    }),
                }
            }
        }
    }

    fn verify_upload(&self, local: &Path, remote: &str, expected: u64) -> ItemResult<()> {
        let actual = match self.storage.stat(remote) {
            Ok(stat) if stat.kind == EntryKind::File => Some(stat.size),
            Ok(_) => None,
            Err(e) => {
                warn!(remote, error = %e, "could not stat destination after upload");
                None
            }
        };
        if actual != Some(expected) {
            return Err(ItemError::SizeMismatch {
                path: remote.to_string(),
                expected,
                actual,
            });
        }

        let Some(algorithm) = self.checksum else {
            return Ok(());
        };
        let Some(remote_sum) = self.storage.checksum(remote, algorithm)? else {
            return Ok(());
        };
        let local_sum = compute_file_checksum(local, algorithm).map_err(|e| ItemError::local(local, e))?;
        if !local_sum.matches(&remote_sum) {
            return Err(ItemError::ChecksumMismatch {
                path: remote.to_string(),
                expected: local_sum.to_string(),
                actual: remote_sum.to_string(),
            });
        }
        Ok(())
    }
}

/// Size of a valid upload source: an existing, non-empty regular file.
fn validate_source(local: &Path) -> ItemResult<u64> {
    let metadata = match fs::metadata(local) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ItemError::InvalidSource {
                path: local.to_path_buf(),
                reason: "does not exist".to_string(),
            });
        }
        Err(e) => return Err(ItemError::local(local, e)),
    };
    if !metadata.is_file() {
        return Err(ItemError::InvalidSource {
            path: local.to_path_buf(),
            reason: "not a regular file".to_string(),
        });
    }
    if metadata.len() == 0 {
        return Err(ItemError::EmptySource {
            path: local.to_path_buf(),
        });
    }
    Ok(metadata.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::fs_backend;
    use crate::checksums::ChecksumAlgorithm;
    use crate::config::StorageConfig;
    use crate::testing::{faulty_backend, Faults, RecordingObserver};
    use crate::StorageBackend;

    #[test]
    fn test_report_scenario() {
        let (_store, local, backend) = fs_backend();
        let report = local.path().join("report.csv");
        fs::write(&report, b"a,b,c\n1,2,3\n").expect("write report");
        let remote = "file://localhost/data/report.csv";

        let put = backend
            .put_file(vec![(remote.to_string(), report.clone())])
            .expect("put");
        assert_eq!(put.successful.get(remote), Some(&12));
        assert!(put.failed.is_empty());

        let exists = backend.exists(remote).expect("exists");
        assert_eq!(exists.successful.get(remote), Some(&true));

        for _ in 0..2 {
            let removed = backend.remove_file(remote).expect("remove");
            assert_eq!(removed.successful.get(remote), Some(&true));
            assert!(removed.failed.is_empty());
        }
        let exists = backend.exists(remote).expect("exists");
        assert_eq!(exists.successful.get(remote), Some(&false));
    }

    #[test]
    fn test_upload_then_download_round_trips() {
        let (_store, local, backend) = fs_backend();
        let src = local.path().join("payload.bin");
        let content: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        fs::write(&src, &content).expect("write payload");

        let session = backend.session().expect("session");
        assert_eq!(session.upload(&src, "/store/payload.bin").expect("upload"), 10_000);

        let out = local.path().join("out");
        let got = backend.get_file("/store/payload.bin", Some(&out)).expect("get");
        assert_eq!(got.successful.get("/store/payload.bin"), Some(&10_000));
        assert_eq!(fs::read(out.join("payload.bin")).expect("read back"), content);
    }

    #[test]
    fn test_upload_overwrites_existing_remote() {
        let (store, local, backend) = fs_backend();
        fs::write(store.path().join("f.txt"), b"old content that is long").expect("write old");
        let src = local.path().join("f.txt");
        fs::write(&src, b"new").expect("write new");

        let session = backend.session().expect("session");
        assert_eq!(session.upload(&src, "/f.txt").expect("upload"), 3);
        assert_eq!(fs::read(store.path().join("f.txt")).expect("read"), b"new");
    }

    #[test]
    fn test_upload_rejects_empty_and_missing_sources() {
        let (_store, local, backend) = fs_backend();
        let empty = local.path().join("empty");
        fs::write(&empty, b"").expect("write empty");

        let result = backend
            .put_file(vec![
                ("/a".to_string(), empty),
                ("/b".to_string(), local.path().join("missing")),
                ("/c".to_string(), local.path().to_path_buf()),
            ])
            .expect("put");
        assert!(result.successful.is_empty());
        assert!(result.failed["/a"].contains("empty"));
        assert!(result.failed["/b"].contains("does not exist"));
        assert!(result.failed["/c"].contains("not a regular file"));
    }

    #[test]
    fn test_size_mismatch_after_upload_removes_remote() {
        let (store, local, backend) = faulty_backend(Faults {
            truncate_copy_in: true,
            ..Faults::default()
        });
        let src = local.path().join("data");
        fs::write(&src, b"0123456789").expect("write");

        let result = backend
            .put_file(vec![("/dir/data".to_string(), src)])
            .expect("put");
        assert!(result.successful.is_empty());
        let message = &result.failed["/dir/data"];
        assert!(message.contains("size mismatch"), "{message}");
        assert!(message.contains("source size: 10"), "{message}");
        assert!(!store.path().join("dir").join("data").exists());
    }

    #[test]
    fn test_cleanup_failure_is_reported_instead_of_mismatch() {
        let (store, local, backend) = faulty_backend(Faults {
            truncate_copy_in: true,
            fail_remove: true,
            ..Faults::default()
        });
        let src = local.path().join("data");
        fs::write(&src, b"0123456789").expect("write");

        let session = backend.session().expect("session");
        let err = session.upload(&src, "/data").expect_err("should fail");
        assert!(matches!(err, ItemError::CleanupFailed { .. }), "{err}");
        // The corrupt artifact survives, which is why this error wins.
        assert!(store.path().join("data").exists());
    }

    #[test]
    fn test_failed_copy_in_reports_remote_error() {
        let (store, local, backend) = faulty_backend(Faults {
            fail_copy_in: true,
            ..Faults::default()
        });
        let src = local.path().join("data");
        fs::write(&src, b"abc").expect("write");

        let session = backend.session().expect("session");
        let err = session.upload(&src, "/data").expect_err("should fail");
        assert!(matches!(err, ItemError::Remote(RemoteError::Io { .. })), "{err}");
        assert!(!store.path().join("data").exists());
    }

    #[test]
    fn test_download_size_mismatch_removes_local_copy() {
        let (store, local, backend) = faulty_backend(Faults {
            pad_copy_out: true,
            ..Faults::default()
        });
        fs::write(store.path().join("remote.dat"), b"12345").expect("write");
        let target = local.path().join("remote.dat");

        let session = backend.session().expect("session");
        let err = session.download("/remote.dat", &target).expect_err("should fail");
        match err {
            ItemError::SizeMismatch { expected, actual, .. } => {
                assert_eq!(expected, 5);
                assert_eq!(actual, Some(6));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!target.exists());
    }

    #[test]
    fn test_download_replaces_existing_local_file() {
        let (store, local, backend) = fs_backend();
        fs::write(store.path().join("f"), b"remote").expect("write remote");
        let target = local.path().join("f");
        fs::write(&target, b"stale local content").expect("write local");

        let session = backend.session().expect("session");
        assert_eq!(session.download("/f", &target).expect("download"), 6);
        assert_eq!(fs::read(&target).expect("read"), b"remote");
    }

    #[test]
    fn test_download_of_directory_is_not_a_file() {
        let (store, local, backend) = fs_backend();
        fs::create_dir(store.path().join("d")).expect("mkdir");

        let result = backend.get_file("/d", Some(local.path())).expect("get");
        assert!(result.failed["/d"].contains("not a file"));
    }

    #[test]
    fn test_checksum_mismatch_after_upload_removes_remote() {
        let (store, local, backend) = faulty_backend(Faults {
            scramble_copy_in: true,
            checksum: Some(ChecksumAlgorithm::Sha256),
            ..Faults::default()
        });
        let src = local.path().join("data");
        fs::write(&src, b"hello world").expect("write");

        let session = backend.session().expect("session");
        let err = session.upload(&src, "/data").expect_err("should fail");
        assert!(matches!(err, ItemError::ChecksumMismatch { .. }), "{err}");
        assert!(!store.path().join("data").exists());
    }

    #[test]
    fn test_checksum_verified_transfer_succeeds() {
        let store = tempfile::tempdir().expect("Failed to create storage dir");
        let local = tempfile::tempdir().expect("Failed to create local dir");
        let config = StorageConfig::new(store.path().to_string_lossy()).with_checksum(ChecksumAlgorithm::Blake3);
        let backend = StorageBackend::open_fs(config);

        let src = local.path().join("data");
        fs::write(&src, b"verified content").expect("write");
        let session = backend.session().expect("session");
        assert_eq!(session.upload(&src, "/data").expect("upload"), 16);
        assert_eq!(session.download("/data", &local.path().join("back")).expect("download"), 16);
    }

    #[test]
    fn test_size_and_metadata() {
        let (store, _local, backend) = fs_backend();
        fs::write(store.path().join("f"), b"1234").expect("write");
        fs::create_dir(store.path().join("d")).expect("mkdir");

        let sizes = backend.get_file_size(vec!["/f", "/d", "/nope"]).expect("size");
        assert_eq!(sizes.successful.get("/f"), Some(&4));
        assert!(sizes.failed["/d"].contains("not a file"));
        assert!(sizes.failed["/nope"].contains("does not exist"));

        let meta = backend.get_file_metadata(vec!["/f", "/d"]).expect("meta");
        let file_meta = &meta.successful["/f"];
        assert!(file_meta.is_file);
        assert_eq!(file_meta.size, Some(4));
        assert!(meta.failed.contains_key("/d"));
    }

    #[test]
    fn test_remove_failure_on_existing_path_is_reported() {
        let (store, _local, backend) = faulty_backend(Faults {
            fail_remove: true,
            ..Faults::default()
        });
        fs::write(store.path().join("f"), b"x").expect("write");

        let result = backend.remove_file(vec!["/f", "/absent"]).expect("remove");
        assert!(result.failed.contains_key("/f"));
        assert_eq!(result.successful.get("/absent"), Some(&true));
    }

    #[test]
    fn test_observer_sees_every_transfer() {
        let (_store, local, backend) = fs_backend();
        let observer = RecordingObserver::default();
        let events = observer.events();
        let backend = backend.with_observer(observer);

        let good = local.path().join("good");
        fs::write(&good, b"data").expect("write");
        let empty = local.path().join("empty");
        fs::write(&empty, b"").expect("write");

        let _ = backend
            .put_file(vec![("/good".to_string(), good), ("/empty".to_string(), empty)])
            .expect("put");

        let events = events.lock().expect("lock").clone();
        assert_eq!(
            events,
            vec![
                "start upload /good".to_string(),
                "done upload /good 4".to_string(),
                "start upload /empty".to_string(),
                "fail upload /empty".to_string(),
            ]
        );
    }
}
