use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport-level identity of a node
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Random peer ID
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// In-process listen address for this peer
    pub fn memory_addr(&self) -> String {
        format!("/memory/{}", self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// What the transport knows about a connected peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: PeerId,
    pub addrs: Vec<String>,
}

/// Identity announced by a protocol participant during the handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub peer_id: PeerId,
    pub peername: String,
    /// Actor ID (hex-encoded)
    pub actor_id: String,
    pub protocol_id: String,
}

/// Application message carried between connected peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub from: PeerId,
    /// Message type, e.g. "dataset_announce"
    pub kind: String,
    pub body: serde_json::Value,
}
