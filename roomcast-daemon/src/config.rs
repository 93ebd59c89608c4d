//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::socket_utils;

/// Node daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Cluster node id (empty = random per start)
    pub node_id: String,

    /// Directory for node sockets (empty = secure runtime dir)
    pub socket_dir: String,

    /// Number of nodes hosted in this process, linked by the in-process bus
    pub nodes: usize,

    /// Dispatch events buffered per subscriber before it lags
    pub bus_capacity: usize,

    /// Log filter used when RUST_LOG is not set
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            config_path: Self::default_config_path(),
            node_id: String::new(),
            socket_dir: String::new(),
            nodes: 1,
            bus_capacity: 1024,
            log_level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from the default location, or create it
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_config_path())
    }

    /// Load configuration from `config_path`, writing defaults if missing.
    /// Not validated here: CLI overrides are applied first, then `validate`.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            // Load existing config
            let contents = std::fs::read_to_string(config_path)
                .context("Failed to read config file")?;

            let mut config: NodeConfig = toml::from_str(&contents)
                .context("Failed to parse config file")?;

            config.config_path = config_path.to_path_buf();
            Ok(config)
        } else {
            // Create default config
            let config = Self {
                config_path: config_path.to_path_buf(),
                ..Self::default()
            };
            config.save()
                .context("Failed to save default config")?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        // Ensure config directory exists
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.nodes == 0 {
            anyhow::bail!("nodes must be at least 1");
        }
        if self.bus_capacity == 0 {
            anyhow::bail!("bus_capacity must be at least 1");
        }
        Ok(())
    }

    /// Node ids for every hosted node. A single node uses the base id as is,
    /// several get a `-<index>` suffix.
    pub fn node_ids(&self) -> Vec<String> {
        // Empty id: generate one for this run
        let base = if self.node_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            self.node_id.clone()
        };

        if self.nodes <= 1 {
            vec![base]
        } else {
            (0..self.nodes).map(|i| format!("{}-{}", base, i)).collect()
        }
    }

    /// Resolved socket directory
    pub fn socket_dir(&self) -> Result<PathBuf> {
        if self.socket_dir.is_empty() {
            socket_utils::get_socket_dir()
        } else {
            let dir = PathBuf::from(&self.socket_dir);
            std::fs::create_dir_all(&dir)
                .context("Failed to create socket directory")?;
            Ok(dir)
        }
    }

    fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("roomcast")
            .join("config.toml")
    }
}
