use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::VellumError;
use crate::types::ids::{generate_actor_id, id_to_hex, parse_actor_id, ActorId};

/// Protocol identifier spoken by vellum peers
pub const DEFAULT_PROTOCOL_ID: &str = "/vellum/0.1.0";

/// Per-subscriber event queue length
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Node configuration stored in <node_dir>/config.toml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Actor ID (hex string)
    pub actor_id: String,
    /// Human readable peer name
    pub peername: String,
    /// Sled directory for logs and snapshots, relative to the node dir
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<String>,
    #[serde(default)]
    pub p2p: P2pConfig,
}

/// Networking configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct P2pConfig {
    #[serde(default = "default_protocol_id")]
    pub protocol_id: String,
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_protocol_id() -> String {
    DEFAULT_PROTOCOL_ID.to_string()
}

fn default_bus_capacity() -> usize {
    DEFAULT_BUS_CAPACITY
}

fn default_enabled() -> bool {
    true
}

impl Default for P2pConfig {
    fn default() -> Self {
        Self {
            protocol_id: default_protocol_id(),
            bus_capacity: default_bus_capacity(),
            enabled: default_enabled(),
        }
    }
}

impl NodeConfig {
    /// Fresh config with a newly generated actor ID
    pub fn generate(peername: &str) -> Self {
        Self {
            actor_id: id_to_hex(&generate_actor_id()),
            peername: peername.to_string(),
            store_path: None,
            p2p: P2pConfig::default(),
        }
    }

    pub fn actor(&self) -> Result<ActorId, VellumError> {
        Ok(parse_actor_id(&self.actor_id)?)
    }

    /// Resolve the store directory against the node directory
    pub fn store_dir(&self, node_dir: &Path) -> PathBuf {
        match &self.store_path {
            Some(path) => node_dir.join(path),
            None => node_dir.join("sled"),
        }
    }
}

/// Load node config from <node_dir>/config.toml
pub fn load_node_config(node_dir: &Path) -> Result<Option<NodeConfig>, VellumError> {
    let config_path = node_dir.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&config_path)?;
    let config: NodeConfig = toml::from_str(&content)?;
    // Reject unparseable actor IDs at load time
    config.actor()?;
    Ok(Some(config))
}

/// Save node config to <node_dir>/config.toml
pub fn save_node_config(node_dir: &Path, config: &NodeConfig) -> Result<(), VellumError> {
    std::fs::create_dir_all(node_dir)?;
    let config_path = node_dir.join("config.toml");
    let content = toml::to_string_pretty(config)?;
    std::fs::write(&config_path, content)?;
    Ok(())
}
