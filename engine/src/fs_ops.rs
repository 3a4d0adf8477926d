//! Local filesystem operations.
//!
//! This module provides the local-side helpers of a transfer:
//! - Copying files with modification time preservation
//! - Copying whole directory trees
//! - Creating parent directories recursively
//! - Enumerating a local directory level in a stable order

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Copy a file from source to destination with metadata preservation.
///
/// Missing parent directories of `dst` are created.
///
/// # Returns
/// Number of bytes copied
pub fn copy_file_with_metadata(src: &Path, dst: &Path) -> io::Result<u64> {
    ensure_parent_dir_exists(dst)?;

    let mut src_file = fs::File::open(src)?;
    let src_mtime = src_file.metadata()?.modified().ok();

    let mut dst_file = fs::File::create(dst)?;
    let bytes_copied = io::copy(&mut src_file, &mut dst_file)?;
    dst_file.sync_all()?;
    drop(dst_file);

    if let Some(mtime) = src_mtime {
        if let Err(e) = filetime::set_file_mtime(dst, filetime::FileTime::from_system_time(mtime)) {
            debug!(path = %dst.display(), error = %e, "could not preserve modification time");
        }
    }

    Ok(bytes_copied)
}

/// Copy a directory tree from `src` to `dst`, creating `dst` as needed.
///
/// Symlinks and other special entries are skipped, never followed.
///
/// # Returns
/// Number of files and bytes copied
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<(u64, u64)> {
    fs::create_dir_all(dst)?;

    let mut files = 0;
    let mut bytes = 0;
    for entry in sorted_entries(src)? {
        let target = dst.join(entry.file_name().unwrap_or_default());
        let file_type = fs::symlink_metadata(&entry)?.file_type();
        if file_type.is_dir() {
            let (f, b) = copy_tree(&entry, &target)?;
            files += f;
            bytes += b;
        } else if file_type.is_file() {
            bytes += copy_file_with_metadata(&entry, &target)?;
            files += 1;
        } else {
            warn!(path = %entry.display(), "skipping entry that is neither file nor directory");
        }
    }
    Ok((files, bytes))
}

/// Ensure the parent directory of a path exists, creating it if necessary.
///
/// # Errors
/// Fails if the parent exists but is not a directory, or cannot be created.
pub fn ensure_parent_dir_exists(path: &Path) -> io::Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    // Skip if parent is empty path (relative root)
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    match fs::metadata(parent) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("parent path exists but is not a directory: {}", parent.display()),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => fs::create_dir_all(parent),
        Err(e) => Err(e),
    }
}

/// The entries of one directory level, sorted by name.
pub fn sorted_entries(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

/// Remove a local file if present. A missing file is not an error.
pub fn remove_local_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
