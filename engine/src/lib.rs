//! # Storage Engine - Verified Transfers for Remote Storage
//!
//! A headless library that moves files and directory trees between the local
//! disk and a remote storage system, and inspects what lives there.
//! Designed as the foundation for multiple front ends (CLI, automation).
//!
//! ## Overview
//!
//! - Batch operations over one path, a list of paths, or a destination/source mapping
//! - Per-item `{Successful, Failed}` envelopes: one bad path never aborts the batch
//! - Size-verified transfers (plus optional checksums) with cleanup of bad copies
//! - Recursive directory upload, download, sizing and removal
//! - A pluggable `RemoteStorage` capability, with a local-directory implementation
//!
//! ## Basic Usage
//!
//! ```no_run
//! use engine::{PathArg, StorageBackend, StorageConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = StorageBackend::open_fs(StorageConfig::new("/mnt/storage"));
//!
//! let uploaded = backend.put_file(PathArg::mapping([("/data/report.csv", "report.csv")]))?;
//! for (path, size) in &uploaded.successful {
//!     println!("{path}: {size} bytes");
//! }
//! for (path, reason) in &uploaded.failed {
//!     eprintln!("{path}: {reason}");
//! }
//!
//! backend.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **args**: Path argument normalization
//! - **backend**: Connection lifecycle and batch operations
//! - **batch**: The per-item result envelope
//! - **remote**: The storage capability trait
//! - **fs_store**: Storage rooted at a local or mounted directory
//! - **metadata**: Normalized entry metadata
//! - **model**: Listings, statistics and transfer outcomes
//! - **config**: TOML connection configuration
//! - **checksums**: Checksum computation
//! - **progress**: Per-file transfer observer
//! - **fs_ops**: Local filesystem helpers
//! - **error**: Error types

pub mod args;
pub mod backend;
pub mod batch;
pub mod checksums;
pub mod config;
mod dir_ops;
pub mod error;
mod file_ops;
pub mod fs_ops;
pub mod fs_store;
pub mod metadata;
pub mod model;
pub mod progress;
pub mod remote;

#[cfg(test)]
mod testing;

pub use args::{PathArg, RemotePath};
pub use backend::{Session, StorageBackend};
pub use batch::BatchResult;
pub use checksums::{compute_file_checksum, ChecksumAlgorithm, ChecksumValue};
pub use config::{ConfigError, StorageConfig};
pub use error::{EngineError, ItemError, ItemResult, RemoteError};
pub use fs_store::FsStorage;
pub use metadata::Metadata;
pub use model::{DirectoryListing, DirectoryStats, Direction, EntryKind, StatRecord, TransferOutcome};
pub use progress::TransferObserver;
pub use remote::RemoteStorage;
