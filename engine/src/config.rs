//! Backend configuration.
//!
//! The configuration is an immutable value handed to the backend constructor
//! and read once while the storage connection is opened.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::checksums::ChecksumAlgorithm;

const DEFAULT_PROTOCOL: &str = "file";
const DEFAULT_HOST: &str = "localhost";

#[inline]
fn default_protocol() -> String {
    DEFAULT_PROTOCOL.to_string()
}

#[inline]
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Connection parameters of one storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// URL scheme of storage paths
    #[serde(default = "default_protocol")]
    pub protocol: String,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default)]
    pub port: u16,

    /// Root of the storage namespace
    pub base_path: String,

    /// Also verify transfers by checksum when the storage can provide one
    #[serde(default)]
    pub checksum: Option<ChecksumAlgorithm>,
}

impl StorageConfig {
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            protocol: default_protocol(),
            host: default_host(),
            port: 0,
            base_path: base_path.into(),
            checksum: None,
        }
    }

    pub fn with_checksum(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.checksum = Some(algorithm);
        self
    }

    /// Load and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: StorageConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_path.trim().is_empty() {
            return Err(ConfigError::Invalid("base_path must not be empty".to_string()));
        }
        if self.protocol.is_empty() || self.protocol.contains(['/', ':']) {
            return Err(ConfigError::Invalid(format!(
                "protocol '{}' is not a valid URL scheme",
                self.protocol
            )));
        }
        Ok(())
    }

    /// Scheme-qualified storage path for `path` (relative to the namespace root).
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if self.port == 0 {
            format!("{}://{}/{}", self.protocol, self.host, path)
        } else {
            format!("{}://{}:{}/{}", self.protocol, self.host, self.port, path)
        }
    }
}
