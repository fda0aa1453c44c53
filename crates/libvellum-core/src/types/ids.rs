use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 128-bit actor identifier (random)
pub type ActorId = [u8; 16];

/// 256-bit logbook entry identifier (content-addressed BLAKE2b-256)
pub type EntryId = [u8; 32];

#[derive(Debug, Error)]
pub enum IdParseError {
    #[error("invalid hex string: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Identity of a lineage: the hex id of its init entry.
///
/// Stable for the life of the lineage. A new `Init` on the same name after a
/// `DeleteAll` produces a different init entry and so a different lineage id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineageId(String);

impl LineageId {
    pub fn from_init_entry(init: &EntryId) -> Self {
        Self(id_to_hex(init))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw bytes of the underlying init entry id
    pub fn to_bytes(&self) -> Result<EntryId, IdParseError> {
        hex_to_id(&self.0)
    }
}

impl fmt::Display for LineageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generate a random 128-bit actor ID
pub fn generate_actor_id() -> ActorId {
    rand::thread_rng().gen()
}

/// Random nonce mixed into init entries so re-created lineages never collide
pub fn generate_nonce() -> u64 {
    rand::thread_rng().gen()
}

/// Convert a fixed-size byte array to lowercase hex string
pub fn id_to_hex<const N: usize>(id: &[u8; N]) -> String {
    hex::encode(id)
}

/// Parse a hex string into a fixed-size byte array
pub fn hex_to_id<const N: usize>(hex_str: &str) -> Result<[u8; N], IdParseError> {
    let bytes = hex::decode(hex_str)?;
    if bytes.len() != N {
        return Err(IdParseError::InvalidLength {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

/// Parse an actor ID from hex string
pub fn parse_actor_id(hex_str: &str) -> Result<ActorId, IdParseError> {
    hex_to_id::<16>(hex_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_actor_id_is_random() {
        assert_ne!(generate_actor_id(), generate_actor_id());
    }

    #[test]
    fn test_hex_to_id_invalid_length() {
        let result: Result<[u8; 16], _> = hex_to_id("0001020304");
        assert!(matches!(result, Err(IdParseError::InvalidLength { .. })));
    }

    #[test]
    fn test_hex_to_id_invalid_hex() {
        let result: Result<[u8; 16], _> = hex_to_id("not_valid_hex!");
        assert!(matches!(result, Err(IdParseError::InvalidHex(_))));
    }

    #[test]
    fn test_lineage_id_bytes() {
        let init = [7u8; 32];
        let lineage = LineageId::from_init_entry(&init);
        assert_eq!(lineage.as_str().len(), 64);
        assert_eq!(lineage.to_bytes().unwrap(), init);
    }
}
