//! Directory operations: listing, statistics, and recursive put/get/remove.
//!
//! Directory transfers never fail as a whole because one file failed; the
//! returned `TransferOutcome` says whether the whole tree made it. Only
//! problems with the directory itself (wrong kind, unreadable listing) are
//! errors.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, error, warn};

use crate::args::RemotePath;
use crate::backend::Session;
use crate::batch::BatchResult;
use crate::error::{ItemError, ItemResult};
use crate::fs_ops;
use crate::metadata::Metadata;
use crate::model::{DirectoryListing, DirectoryStats, EntryKind, TransferOutcome};
use crate::remote::RemoteStorage;

impl<S: RemoteStorage> Session<'_, S> {
    /// Whether `path` is a directory. A missing path is an error, not `false`.
    pub fn is_directory(&self, path: &str) -> ItemResult<bool> {
        Ok(self.storage.stat(path)?.kind == EntryKind::Directory)
    }

    /// Create a directory and any missing parents.
    pub fn create_directory(&self, path: &str) -> ItemResult<()> {
        debug!(path, "creating directory");
        Ok(self.storage.mkdir(path)?)
    }

    /// Metadata of an entry that must be a directory.
    pub fn directory_metadata(&self, path: &str) -> ItemResult<Metadata> {
        let metadata = self.metadata(path)?;
        if !metadata.is_directory {
            return Err(ItemError::NotADirectory {
                path: path.to_string(),
            });
        }
        Ok(metadata)
    }

    /// Files and subdirectories below `path`.
    ///
    /// Entries that are neither are logged and left out.
    pub fn list_directory(&self, path: &str, recursive: bool) -> ItemResult<DirectoryListing> {
        self.require_directory(path)?;
        self.partitioned_listing(path, recursive)
    }

    pub fn directory_size(&self, path: &str, recursive: bool) -> ItemResult<DirectoryStats> {
        Ok(self.list_directory(path, recursive)?.stats())
    }

    /// Upload several files, one envelope entry per destination.
    pub fn put_files(&self, pairs: &[(RemotePath, PathBuf)]) -> BatchResult<u64> {
        BatchResult::collect(
            pairs.iter(),
            |(dest, _)| dest.clone(),
            |(dest, src)| self.upload(src, dest),
        )
    }

    /// Upload the tree under `local_dir` to `remote_dir`, depth first.
    ///
    /// The files of each directory level go up together as one batch once
    /// that level's subdirectories are done. Local symlinks are skipped.
    pub fn put_directory(&self, local_dir: &Path, remote_dir: &str) -> ItemResult<TransferOutcome> {
        if !local_dir.is_dir() {
            return Err(ItemError::InvalidSource {
                path: local_dir.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }
        debug!(local = %local_dir.display(), remote = remote_dir, "putting directory");
        self.storage.mkdir(remote_dir)?;

        let entries = fs_ops::sorted_entries(local_dir).map_err(|e| ItemError::local(local_dir, e))?;
        let mut outcome = TransferOutcome::default();
        let mut files = Vec::new();

        for entry in entries {
            let Some(name) = entry.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let remote = join_remote(remote_dir, &name);
            let file_type = match fs::symlink_metadata(&entry) {
                Ok(metadata) => metadata.file_type(),
                Err(e) => {
                    error!(local = %entry.display(), error = %e, "failed to inspect local entry");
                    outcome.all_completed = false;
                    continue;
                }
            };
            if file_type.is_dir() {
                match self.put_directory(&entry, &remote) {
                    Ok(child) => outcome.absorb(child),
                    Err(e) => {
                        error!(local = %entry.display(), error = %e, "failed to put subdirectory");
                        outcome.all_completed = false;
                    }
                }
            } else if file_type.is_file() {
                files.push((remote, entry));
            } else {
                warn!(local = %entry.display(), "skipping entry that is neither file nor directory");
            }
        }

        if !files.is_empty() {
            let batch = self.put_files(&files);
            for size in batch.successful.values() {
                outcome.add_file(*size);
            }
            if !batch.all_successful() {
                outcome.all_completed = false;
            }
        }

        Ok(outcome)
    }

    /// Download the tree under `remote_dir` into `local_dir`.
    ///
    /// An existing destination is filled file by file with verified
    /// downloads. A missing destination is produced by one bulk copy, checked
    /// against the listing's totals.
    pub fn get_directory(&self, remote_dir: &str, local_dir: &Path) -> ItemResult<TransferOutcome> {
        self.require_directory(remote_dir)?;
        let listing = self.partitioned_listing(remote_dir, true)?;
        let stats = listing.stats();
        debug!(remote = remote_dir, files = stats.files, size = stats.size, "getting directory");

        match fs::metadata(local_dir) {
            Ok(existing) if existing.is_dir() => Ok(self.download_each(remote_dir, local_dir, &listing)),
            Ok(_) => Err(ItemError::InvalidSource {
                path: local_dir.to_path_buf(),
                reason: "destination exists and is not a directory".to_string(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.download_bulk(remote_dir, local_dir, stats),
            Err(e) => Err(ItemError::local(local_dir, e)),
        }
    }

    fn download_each(&self, remote_dir: &str, local_dir: &Path, listing: &DirectoryListing) -> TransferOutcome {
        let mut outcome = TransferOutcome::default();

        for sub_dir in listing.sub_dirs.keys() {
            let created = relative_local(local_dir, remote_dir, sub_dir)
                .ok_or_else(|| format!("{sub_dir} is not below {remote_dir}"))
                .and_then(|target| fs::create_dir_all(target).map_err(|e| e.to_string()));
            if let Err(e) = created {
                error!(path = %sub_dir, error = %e, "failed to create local directory");
                outcome.all_completed = false;
            }
        }

        for file in listing.files.keys() {
            let Some(target) = relative_local(local_dir, remote_dir, file) else {
                error!(path = %file, base = remote_dir, "listed file is not below the directory");
                outcome.all_completed = false;
                continue;
            };
            match self.download(file, &target) {
                Ok(size) => outcome.add_file(size),
                Err(e) => {
                    error!(path = %file, error = %e, "failed to get file");
                    outcome.all_completed = false;
                }
            }
        }
        outcome
    }

    fn download_bulk(&self, remote_dir: &str, local_dir: &Path, expected: DirectoryStats) -> ItemResult<TransferOutcome> {
        if let Err(e) = self.storage.copy_out(remote_dir, local_dir) {
            if local_dir.exists() {
                if let Err(cleanup) = fs::remove_dir_all(local_dir) {
                    warn!(local = %local_dir.display(), error = %cleanup, "failed to remove partial download");
                }
            }
            return Err(e.into());
        }

        let (files, size) = local_tree_totals(local_dir).map_err(|e| ItemError::local(local_dir, e))?;
        let all_completed = files == expected.files && size == expected.size;
        if !all_completed {
            error!(
                remote = remote_dir,
                expected_files = expected.files,
                expected_size = expected.size,
                files,
                size,
                "bulk download does not match the remote listing"
            );
        }
        Ok(TransferOutcome {
            all_completed,
            files: expected.files,
            size: expected.size,
        })
    }

    /// Remove a directory.
    ///
    /// Non-recursive removal deletes the files directly inside and the
    /// directory itself only when nothing else is left. Recursive removal
    /// measures the tree first, then removes it in one call.
    pub fn remove_directory(&self, path: &str, recursive: bool) -> ItemResult<TransferOutcome> {
        self.require_directory(path)?;

        if recursive {
            let stats = self.partitioned_listing(path, true)?.stats();
            let all_completed = match self.remove_remote(path) {
                Ok(()) => true,
                Err(e) => {
                    error!(path, error = %e, "recursive remove failed");
                    false
                }
            };
            return Ok(TransferOutcome {
                all_completed,
                files: stats.files,
                size: stats.size,
            });
        }

        let listing = self.partitioned_listing(path, false)?;
        let mut outcome = TransferOutcome::default();
        for (file, metadata) in &listing.files {
            match self.remove_remote(file) {
                Ok(()) => outcome.add_file(metadata.size.unwrap_or(0)),
                Err(e) => {
                    error!(path = %file, error = %e, "failed to remove file");
                    outcome.all_completed = false;
                }
            }
        }

        if !listing.sub_dirs.is_empty() {
            debug!(path, subdirs = listing.sub_dirs.len(), "subdirectories remain, keeping directory");
            outcome.all_completed = false;
        }
        if outcome.all_completed {
            if let Err(e) = self.remove_remote(path) {
                error!(path, error = %e, "failed to remove emptied directory");
                outcome.all_completed = false;
            }
        }
        Ok(outcome)
    }

    fn require_directory(&self, path: &str) -> ItemResult<()> {
        if self.is_directory(path)? {
            Ok(())
        } else {
            Err(ItemError::NotADirectory {
                path: path.to_string(),
            })
        }
    }

    fn partitioned_listing(&self, path: &str, recursive: bool) -> ItemResult<DirectoryListing> {
        let mut listing = DirectoryListing::default();
        for record in self.storage.list(path, recursive)? {
            let metadata = Metadata::from_stat(&record);
            if metadata.is_directory {
                listing.sub_dirs.insert(record.path, metadata);
            } else if metadata.is_file {
                listing.files.insert(record.path, metadata);
            } else {
                warn!(path = %record.path, "skipping entry that is neither file nor directory");
            }
        }
        Ok(listing)
    }
}

fn join_remote(dir: &str, name: &str) -> RemotePath {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

/// Local counterpart of `path` (a path below `base`) under `root`.
fn relative_local(root: &Path, base: &str, path: &str) -> Option<PathBuf> {
    let rest = path.strip_prefix(base.trim_end_matches('/'))?;
    if !rest.starts_with('/') {
        return None;
    }
    let relative = Path::new(rest.trim_start_matches('/'));
    if relative.as_os_str().is_empty()
        || relative.components().any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(root.join(relative))
}

fn local_tree_totals(dir: &Path) -> io::Result<(u64, u64)> {
    let mut files = 0;
    let mut size = 0;
    for entry in fs_ops::sorted_entries(dir)? {
        let metadata = fs::symlink_metadata(&entry)?;
        if metadata.is_dir() {
            let (f, s) = local_tree_totals(&entry)?;
            files += f;
            size += s;
        } else if metadata.is_file() {
            files += 1;
            size += metadata.len();
        }
    }
    Ok((files, size))
}
