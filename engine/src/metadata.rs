//! Conversion of raw stat records into canonical metadata.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::model::{EntryKind, StatRecord};

const OWNER_READ: u32 = 0o400;
const OWNER_WRITE: u32 = 0o200;
const OWNER_EXEC: u32 = 0o100;

/// Canonical metadata of a storage entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Metadata {
    #[serde(rename = "File")]
    pub is_file: bool,

    #[serde(rename = "Directory")]
    pub is_directory: bool,

    /// Permission bits as reported by the storage
    pub mode: u32,

    /// Size in bytes; `None` for anything that is not a file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Last modification; `None` when the storage never recorded one
    #[serde(serialize_with = "serialize_mod_time")]
    pub mod_time: Option<DateTime<Utc>>,

    pub executable: bool,
    pub readable: bool,
    pub writable: bool,
}

impl Metadata {
    /// Normalize a raw stat record.
    pub fn from_stat(stat: &StatRecord) -> Self {
        let is_file = stat.kind == EntryKind::File;
        let mod_time = if stat.last_modified > 0 {
            DateTime::from_timestamp(stat.last_modified, 0)
        } else {
            None
        };

        Metadata {
            is_file,
            is_directory: stat.kind == EntryKind::Directory,
            mode: stat.permissions,
            size: is_file.then_some(stat.size),
            mod_time,
            executable: stat.permissions & OWNER_EXEC != 0,
            readable: stat.permissions & OWNER_READ != 0,
            writable: stat.permissions & OWNER_WRITE != 0,
        }
    }

    /// Neither a file nor a directory.
    pub fn is_other(&self) -> bool {
        !self.is_file && !self.is_directory
    }
}

fn serialize_mod_time<S: Serializer>(
    value: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(time) => serializer.serialize_str(&time.to_rfc3339()),
        None => serializer.serialize_str("Never"),
    }
}
