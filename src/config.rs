// src/config.rs
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/// Top-level configuration, loaded from `config.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
}

/// Server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// The listening port.
    pub port: u16,

    /// The asset folder, relative to the working directory.
    pub asset_folder: PathBuf,

    /// The alive time of clients, in seconds.
    pub alive_time: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 10000,
            asset_folder: PathBuf::from("assets"),
            alive_time: 60,
        }
    }
}

impl ServerConfig {
    pub fn alive_duration(&self) -> Duration {
        Duration::from_secs(self.alive_time)
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Load the configuration file if it exists; a missing or malformed file
    /// falls back to the defaults with a warning.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("failed to load local configuration: {err}");
                Self::default()
            }
        }
    }
}
