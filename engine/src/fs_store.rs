//! A storage whose namespace is a directory tree on a locally mounted
//! filesystem (POSIX storage element, NFS/FUSE mount of the bulk storage).
//!
//! Storage paths may be scheme-qualified (`file://host/data/x`) or bare
//! (`/data/x`); either way the path part is resolved below the configured
//! root and may not escape it.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::checksums::{compute_file_checksum, ChecksumAlgorithm, ChecksumValue};
use crate::config::StorageConfig;
use crate::error::RemoteError;
use crate::fs_ops;
use crate::model::{EntryKind, StatRecord};
use crate::remote::RemoteStorage;

#[derive(Debug)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Open the storage rooted at `config.base_path`.
    pub fn open(config: &StorageConfig) -> Result<Self, RemoteError> {
        let root = PathBuf::from(&config.base_path);
        let metadata = fs::metadata(&root).map_err(|e| RemoteError::from_io(&config.base_path, &e))?;
        if !metadata.is_dir() {
            return Err(RemoteError::Io {
                path: config.base_path.clone(),
                message: "storage root is not a directory".to_string(),
            });
        }
        debug!(root = %root.display(), "opened filesystem storage");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a storage path onto the local tree.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, RemoteError> {
        let path_part = match path.find("://") {
            // Drop the authority: everything up to the first '/' after the scheme.
            Some(idx) => {
                let rest = &path[idx + 3..];
                rest.find('/').map_or("", |slash| &rest[slash..])
            }
            None => path,
        };

        let mut resolved = self.root.clone();
        for component in Path::new(path_part).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(RemoteError::InvalidPath {
                        path: path.to_string(),
                        reason: "path escapes the storage root".to_string(),
                    });
                }
            }
        }
        Ok(resolved)
    }

    fn stat_local(&self, path: &str, local: &Path) -> Result<StatRecord, RemoteError> {
        let metadata = fs::symlink_metadata(local).map_err(|e| RemoteError::from_io(path, &e))?;
        Ok(record(path.to_string(), &metadata))
    }

    fn list_into(
        &self,
        path: &str,
        local: &Path,
        recursive: bool,
        records: &mut Vec<StatRecord>,
    ) -> Result<(), RemoteError> {
        let entries = fs_ops::sorted_entries(local).map_err(|e| RemoteError::from_io(path, &e))?;
        for entry in entries {
            let Some(name) = entry.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let child = format!("{}/{}", path.trim_end_matches('/'), name);
            let stat = self.stat_local(&child, &entry)?;
            let is_dir = stat.kind == EntryKind::Directory;
            records.push(stat);
            if recursive && is_dir {
                self.list_into(&child, &entry, true, records)?;
            }
        }
        Ok(())
    }
}

fn record(path: String, metadata: &fs::Metadata) -> StatRecord {
    let file_type = metadata.file_type();
    let kind = if file_type.is_file() {
        EntryKind::File
    } else if file_type.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::Other
    };

    let last_modified = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .and_then(|d| i64::try_from(d.as_secs()).ok())
        .unwrap_or(0);

    StatRecord {
        path,
        kind,
        permissions: permission_bits(metadata),
        size: metadata.len(),
        last_modified,
    }
}

#[cfg(unix)]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
    let base = if metadata.permissions().readonly() { 0o444 } else { 0o644 };
    if metadata.is_dir() {
        base | 0o111
    } else {
        base
    }
}

impl RemoteStorage for FsStorage {
    fn exists(&self, path: &str) -> Result<bool, RemoteError> {
        let local = self.resolve(path)?;
        match fs::symlink_metadata(&local) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RemoteError::from_io(path, &e)),
        }
    }

    fn stat(&self, path: &str) -> Result<StatRecord, RemoteError> {
        let local = self.resolve(path)?;
        self.stat_local(path, &local)
    }

    fn list(&self, path: &str, recursive: bool) -> Result<Vec<StatRecord>, RemoteError> {
        let local = self.resolve(path)?;
        let mut records = Vec::new();
        self.list_into(path, &local, recursive, &mut records)?;
        Ok(records)
    }

    fn copy_in(&self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        let target = self.resolve(remote)?;
        let io_err = |e: io::Error| RemoteError::from_io(remote, &e);

        fs_ops::ensure_parent_dir_exists(&target).map_err(io_err)?;
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| RemoteError::InvalidPath {
                path: remote.to_string(),
                reason: "path has no file name".to_string(),
            })?;

        // Stage next to the target so the final rename stays on one filesystem.
        let part = target.with_file_name(format!(".{name}.{}.part", Uuid::new_v4()));
        let staged = fs_ops::copy_file_with_metadata(local, &part)
            .and_then(|_| fs::rename(&part, &target));
        if let Err(e) = staged {
            if let Err(cleanup) = fs_ops::remove_local_file(&part) {
                warn!(part = %part.display(), error = %cleanup, "failed to remove staging file");
            }
            // The source side failing is not a storage NotFound.
            return Err(RemoteError::Io {
                path: remote.to_string(),
                message: e.to_string(),
            });
        }
        Ok(())
    }

    fn copy_out(&self, remote: &str, local: &Path) -> Result<(), RemoteError> {
        let source = self.resolve(remote)?;
        let metadata = fs::metadata(&source).map_err(|e| RemoteError::from_io(remote, &e))?;
        let copied = if metadata.is_dir() {
            fs_ops::copy_tree(&source, local).map(|_| ())
        } else {
            fs_ops::copy_file_with_metadata(&source, local).map(|_| ())
        };
        copied.map_err(|e| RemoteError::Io {
            path: remote.to_string(),
            message: format!("copy to {} failed: {e}", local.display()),
        })
    }

    fn remove(&self, path: &str) -> Result<(), RemoteError> {
        let local = self.resolve(path)?;
        if local == self.root {
            return Err(RemoteError::InvalidPath {
                path: path.to_string(),
                reason: "refusing to remove the storage root".to_string(),
            });
        }
        let metadata = fs::symlink_metadata(&local).map_err(|e| RemoteError::from_io(path, &e))?;
        let removed = if metadata.is_dir() {
            fs::remove_dir_all(&local)
        } else {
            fs::remove_file(&local)
        };
        removed.map_err(|e| RemoteError::from_io(path, &e))
    }

    fn mkdir(&self, path: &str) -> Result<(), RemoteError> {
        let local = self.resolve(path)?;
        fs::create_dir_all(&local).map_err(|e| RemoteError::from_io(path, &e))
    }

    fn checksum(
        &self,
        path: &str,
        algorithm: ChecksumAlgorithm,
    ) -> Result<Option<ChecksumValue>, RemoteError> {
        let local = self.resolve(path)?;
        compute_file_checksum(&local, algorithm)
            .map(Some)
            .map_err(|e| RemoteError::from_io(path, &e))
    }
}
