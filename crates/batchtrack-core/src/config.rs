//! Configuration management for the batch tracking system

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, TrackError};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackConfig {
    pub storage: StorageConfig,

    #[serde(default = "default_broadcast")]
    pub broadcast: BroadcastConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the file-backed store
    #[serde(alias = "data_dir")]
    pub data_root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_broadcast() -> BroadcastConfig {
    BroadcastConfig {
        channel_capacity: default_channel_capacity(),
    }
}

fn default_channel_capacity() -> usize {
    256
}

impl TrackConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TrackError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_json_str(&content)
    }

    /// Load configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| TrackError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage.data_root.trim().is_empty() {
            return Err(TrackError::Config(
                "Storage data_root is required".to_string(),
            ));
        }
        if self.broadcast.channel_capacity == 0 {
            return Err(TrackError::Config(
                "Broadcast channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
