//! # Configuration
//!
//! Settings are resolved in priority order:
//! 1. **Environment variables**: `CARECLOUD_DATABASE_PATH`,
//!    `CARECLOUD_BLOB_BASE_URL`, `CARECLOUD_UPLOAD_CHUNK_SIZE`, `CARECLOUD_LOG`.
//! 2. **JSON file**: passed to [`CareCloudConfig::from_json_file`].
//! 3. **Compiled defaults**: [`CareCloudConfig::default`].
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `database_path` | none (in-memory) | SQLite file backing both stores |
//! | `blob_base_url` | `http://localhost:9199/v0/b/carecloud/o` | Prefix of retrieval URLs |
//! | `upload_chunk_size` | `262144` | Bytes per upload chunk |
//! | `log_filter` | `info` | `tracing` filter directive |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::DEFAULT_CHUNK_SIZE;

pub const ENV_DATABASE_PATH: &str = "CARECLOUD_DATABASE_PATH";
pub const ENV_BLOB_BASE_URL: &str = "CARECLOUD_BLOB_BASE_URL";
pub const ENV_UPLOAD_CHUNK_SIZE: &str = "CARECLOUD_UPLOAD_CHUNK_SIZE";
pub const ENV_LOG: &str = "CARECLOUD_LOG";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Runtime configuration for the local stores and logging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CareCloudConfig {
    /// SQLite file for documents and blobs; `None` keeps everything in memory
    pub database_path: Option<PathBuf>,
    /// Base of blob retrieval URLs
    pub blob_base_url: String,
    /// Upload chunk size in bytes
    pub upload_chunk_size: usize,
    /// `tracing` filter directive
    pub log_filter: String,
}

impl Default for CareCloudConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            blob_base_url: "http://localhost:9199/v0/b/carecloud/o".to_string(),
            upload_chunk_size: DEFAULT_CHUNK_SIZE,
            log_filter: "info".to_string(),
        }
    }
}

impl CareCloudConfig {
    /// Load from a JSON file. Missing keys take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::default().with_env(std::env::vars())
    }

    /// Overlay `CARECLOUD_*` variables from `vars`.
    pub fn with_env<I>(mut self, vars: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                ENV_DATABASE_PATH => {
                    self.database_path = (!value.is_empty()).then(|| PathBuf::from(value));
                }
                ENV_BLOB_BASE_URL => self.blob_base_url = value,
                ENV_UPLOAD_CHUNK_SIZE => {
                    self.upload_chunk_size =
                        value.trim().parse().map_err(|e| ConfigError::InvalidValue {
                            key: ENV_UPLOAD_CHUNK_SIZE.to_string(),
                            message: format!("{:?}: {}", value, e),
                        })?;
                }
                ENV_LOG => self.log_filter = value,
                _ => {}
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values the stores cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.upload_chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "upload_chunk_size".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.blob_base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "blob_base_url".into(),
                message: "must not be empty".into(),
            });
        }
        Ok(())
    }
}
