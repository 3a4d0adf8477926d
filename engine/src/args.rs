//! Call argument shapes and their normalization.
//!
//! Every public operation accepts a `PathArg`: one path, a list of paths, or
//! a destination → source mapping for put-style calls. Normalization happens
//! once, before any per-path work, and is the only place a call can be
//! rejected for its shape.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::EngineError;

/// A path on the remote storage (scheme-qualified, e.g. `hdfs://nn:8020/data/x`).
pub type RemotePath = String;

/// The argument of a batch operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathArg {
    /// One remote path
    Single(RemotePath),
    /// An ordered list of remote paths
    List(Vec<RemotePath>),
    /// Ordered destination → local source pairs
    Mapping(Vec<(RemotePath, PathBuf)>),
}

impl PathArg {
    /// Build a mapping argument from `(destination, source)` pairs.
    pub fn mapping<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<RemotePath>,
        V: Into<PathBuf>,
    {
        Self::Mapping(
            pairs
                .into_iter()
                .map(|(dest, src)| (dest.into(), src.into()))
                .collect(),
        )
    }

    /// Normalize into an ordered list of unique remote paths.
    ///
    /// A mapping contributes its destination keys. Duplicates keep their
    /// first position.
    pub fn into_paths(self) -> Result<Vec<RemotePath>, EngineError> {
        let paths = match self {
            Self::Single(path) => vec![path],
            Self::List(paths) => paths,
            Self::Mapping(pairs) => pairs.into_iter().map(|(dest, _)| dest).collect(),
        };

        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(paths.len());
        for path in paths {
            if path.trim().is_empty() {
                return Err(EngineError::argument("empty path in argument"));
            }
            if seen.insert(path.clone()) {
                unique.push(path);
            }
        }
        Ok(unique)
    }

    /// Normalize into ordered `(destination, source)` pairs.
    ///
    /// Only a mapping is accepted: a bare path carries no source to put.
    pub fn into_mapping(self) -> Result<Vec<(RemotePath, PathBuf)>, EngineError> {
        let pairs = match self {
            Self::Mapping(pairs) => pairs,
            Self::Single(_) | Self::List(_) => {
                return Err(EngineError::argument(
                    "expected a mapping { destination path: local source }",
                ));
            }
        };

        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(pairs.len());
        for (dest, src) in pairs {
            if dest.trim().is_empty() {
                return Err(EngineError::argument("empty destination path in mapping"));
            }
            if src.as_os_str().is_empty() {
                return Err(EngineError::argument(format!(
                    "source not set for destination {dest}"
                )));
            }
            if seen.insert(dest.clone()) {
                unique.push((dest, src));
            }
        }
        Ok(unique)
    }
}

impl From<&str> for PathArg {
    fn from(path: &str) -> Self {
        Self::Single(path.to_string())
    }
}

impl From<String> for PathArg {
    fn from(path: String) -> Self {
        Self::Single(path)
    }
}

impl From<&String> for PathArg {
    fn from(path: &String) -> Self {
        Self::Single(path.clone())
    }
}

impl From<Vec<String>> for PathArg {
    fn from(paths: Vec<String>) -> Self {
        Self::List(paths)
    }
}

impl From<Vec<&str>> for PathArg {
    fn from(paths: Vec<&str>) -> Self {
        Self::List(paths.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for PathArg {
    fn from(paths: &[&str]) -> Self {
        Self::List(paths.iter().map(|p| (*p).to_string()).collect())
    }
}

impl From<Vec<(String, PathBuf)>> for PathArg {
    fn from(pairs: Vec<(String, PathBuf)>) -> Self {
        Self::Mapping(pairs)
    }
}
