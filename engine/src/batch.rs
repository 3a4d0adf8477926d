//! The `{Successful, Failed}` envelope returned by every batch operation.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::error;

use crate::args::RemotePath;
use crate::error::ItemResult;

/// Per-path outcome of a batch call.
///
/// Every input path appears in exactly one of the two maps.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BatchResult<V> {
    pub successful: BTreeMap<RemotePath, V>,
    pub failed: BTreeMap<RemotePath, String>,
}

impl<V> Default for BatchResult<V> {
    fn default() -> Self {
        Self {
            successful: BTreeMap::new(),
            failed: BTreeMap::new(),
        }
    }
}

impl<V> BatchResult<V> {
    /// Run `op` on every item in order and fold the outcomes.
    ///
    /// All items are attempted; a failure never stops the batch. `key`
    /// selects the path an item is reported under.
    pub fn collect<T, K, F>(items: impl IntoIterator<Item = T>, key: K, mut op: F) -> Self
    where
        K: Fn(&T) -> RemotePath,
        F: FnMut(&T) -> ItemResult<V>,
    {
        let mut result = Self::default();
        for item in items {
            let path = key(&item);
            let outcome = op(&item);
            result.record(path, outcome);
        }
        result
    }

    /// Route one outcome into the matching half of the envelope.
    pub fn record(&mut self, path: RemotePath, outcome: ItemResult<V>) {
        match outcome {
            Ok(value) => {
                self.failed.remove(&path);
                self.successful.insert(path, value);
            }
            Err(e) => {
                error!(path = %path, error = %e, "operation failed");
                self.successful.remove(&path);
                self.failed.insert(path, e.to_string());
            }
        }
    }

    /// Number of paths in the envelope.
    pub fn len(&self) -> usize {
        self.successful.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when no path failed.
    pub fn all_successful(&self) -> bool {
        self.failed.is_empty()
    }
}
