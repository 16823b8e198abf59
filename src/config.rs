//! Node configuration
//!
//! Every section has working defaults; a JSON file only needs to name the
//! fields it overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::replication::ReplicationTargets;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Replica targets must not decrease with priority")]
    NonMonotoneTargets,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub replication: ReplicationTargets,
    pub exchange: ExchangeConfig,
    pub proof: ProofConfig,
    pub packaging: PackagingConfig,
    pub upload: UploadConfig,
    /// Where snapshots and the shard store live
    pub data_dir: Option<PathBuf>,
}

/// Default slack bases for new exchange contracts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub my_slack_base: u64,
    pub peer_slack_base: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProofConfig {
    /// Bytes of salt per hourly challenge
    pub salt_len: usize,
    /// Longest evidence calendar generated for one block; later hours go
    /// unchallenged
    pub max_window_hours: u32,
}

impl Default for ProofConfig {
    fn default() -> Self {
        Self {
            salt_len: 32,
            max_window_hours: 24 * 366,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagingConfig {
    /// zstd level tried on every shard
    pub compression_level: i32,
    /// Bytes of per-block salt
    pub salt_len: usize,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            compression_level: crate::packaging::compression::DEFAULT_LEVEL,
            salt_len: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Quiet period before a burst of storage changes triggers one upload run
    pub quiet_period_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: 30_000,
        }
    }
}

impl UploadConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }
}

impl BackupConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        if !config.replication.is_monotone() {
            return Err(ConfigError::NonMonotoneTargets);
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Configured data directory, or the platform default
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("peer-backup")
        })
    }
}
