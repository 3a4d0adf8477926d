//! Transfer progress reporting.
//!
//! This module defines the TransferObserver trait, which decouples the
//! engine from whatever front end wants to show per-file progress.

use std::path::Path;

use crate::model::Direction;

/// Receives a callback around every single-file transfer, including the
/// ones performed while walking a directory.
///
/// All methods are called synchronously on the calling thread and default to
/// doing nothing.
pub trait TransferObserver: Send {
    /// Called before a file transfer starts.
    fn on_file_started(&self, _direction: Direction, _remote: &str, _local: &Path) {}

    /// Called once the transfer finished, with the verified size or the
    /// failure message.
    fn on_file_completed(&self, _direction: Direction, _remote: &str, _outcome: Result<u64, &str>) {}
}
