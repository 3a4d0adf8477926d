//! Core data model shared by the file and directory operations.
//!
//! This module defines:
//! - StatRecord / EntryKind: the raw record a storage returns for one entry
//! - DirectoryListing: a listing partitioned into files and subdirectories
//! - DirectoryStats: aggregated counts over a listing
//! - TransferOutcome: the result of a directory put/get/remove

use std::collections::BTreeMap;

use serde::Serialize;

use crate::args::RemotePath;
use crate::metadata::Metadata;

/// Kind of a storage entry as reported by the storage itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    /// Links, devices and anything else the storage may report
    Other,
}

/// Raw stat record for one entry on the storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatRecord {
    /// Full storage path of the entry
    pub path: RemotePath,

    pub kind: EntryKind,

    /// Unix permission bits
    pub permissions: u32,

    /// Size in bytes (meaningful for files only)
    pub size: u64,

    /// Last modification, seconds since the Unix epoch; 0 when never recorded
    pub last_modified: i64,
}

/// A directory listing partitioned by entry kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DirectoryListing {
    pub files: BTreeMap<RemotePath, Metadata>,
    pub sub_dirs: BTreeMap<RemotePath, Metadata>,
}

impl DirectoryListing {
    /// Fold the listing into counts and total file size.
    pub fn stats(&self) -> DirectoryStats {
        DirectoryStats {
            files: self.files.len() as u64,
            size: self.files.values().filter_map(|m| m.size).sum(),
            subdirs: self.sub_dirs.len() as u64,
        }
    }
}

/// Aggregated statistics of a directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryStats {
    /// Number of files
    pub files: u64,
    /// Sum of file sizes in bytes
    pub size: u64,
    /// Number of subdirectories
    pub subdirs: u64,
}

/// Result of a recursive directory transfer or removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransferOutcome {
    /// True only if every file and subdirectory in the tree was processed
    pub all_completed: bool,
    /// Files transferred (or removed)
    pub files: u64,
    /// Bytes transferred (or removed)
    pub size: u64,
}

impl Default for TransferOutcome {
    fn default() -> Self {
        Self {
            all_completed: true,
            files: 0,
            size: 0,
        }
    }
}

impl TransferOutcome {
    /// Fold a child outcome into this one.
    pub fn absorb(&mut self, child: TransferOutcome) {
        self.all_completed &= child.all_completed;
        self.files += child.files;
        self.size += child.size;
    }

    /// Count one transferred file.
    pub fn add_file(&mut self, size: u64) {
        self.files += 1;
        self.size += size;
    }
}

/// Direction of a single-file transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Local → storage
    Upload,
    /// Storage → local
    Download,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Upload => write!(f, "upload"),
            Direction::Download => write!(f, "download"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_absorb_is_conjunctive() {
        let mut parent = TransferOutcome::default();
        parent.add_file(100);
        parent.absorb(TransferOutcome {
            all_completed: true,
            files: 2,
            size: 50,
        });
        assert!(parent.all_completed);

        parent.absorb(TransferOutcome {
            all_completed: false,
            files: 0,
            size: 0,
        });
        assert!(!parent.all_completed);
        assert_eq!(parent.files, 3);
        assert_eq!(parent.size, 150);
    }
}
