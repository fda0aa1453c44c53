use serde::{Deserialize, Serialize};

use crate::error::VellumError;
use crate::hash::compute_entry_id;
use crate::types::ids::{id_to_hex, ActorId, EntryId};

/// Lifecycle action recorded by a logbook entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// First entry of a lineage; its id is the lineage id
    Init { name: String, nonce: u64 },
    /// A new version, referencing a snapshot path
    Commit {
        snapshot_ref: String,
        summary: String,
    },
    /// Tombstone hiding the most recent `count` visible commits
    DeleteRevisions { count: usize },
    /// Terminal tombstone covering the whole lineage
    DeleteAll,
}

impl EntryKind {
    /// Get the kind tag used in the hash preimage
    pub fn kind_tag(&self) -> u32 {
        match self {
            EntryKind::Init { .. } => 1,
            EntryKind::Commit { .. } => 2,
            EntryKind::DeleteRevisions { .. } => 3,
            EntryKind::DeleteAll => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Init { .. } => "init",
            EntryKind::Commit { .. } => "commit",
            EntryKind::DeleteRevisions { .. } => "delete_revisions",
            EntryKind::DeleteAll => "delete_all",
        }
    }
}

/// One append-only entry in a logbook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Content-addressed entry ID (BLAKE2b-256)
    pub id: EntryId,
    /// Previous entry in the same log, `None` only for the init entry
    pub prev: Option<EntryId>,
    /// Actor who wrote this entry
    pub actor: ActorId,
    /// Unix timestamp in milliseconds
    pub ts_unix_ms: u64,
    pub kind: EntryKind,
}

impl LogEntry {
    /// Create an entry, computing its id from the other fields
    pub fn new(
        prev: Option<EntryId>,
        actor: ActorId,
        ts_unix_ms: u64,
        kind: EntryKind,
    ) -> Result<Self, VellumError> {
        let id = compute_entry_id(prev.as_ref(), &actor, ts_unix_ms, &kind)?;
        Ok(Self {
            id,
            prev,
            actor,
            ts_unix_ms,
            kind,
        })
    }

    /// Check that the id matches the entry content
    pub fn verify(&self) -> Result<(), VellumError> {
        let computed = compute_entry_id(self.prev.as_ref(), &self.actor, self.ts_unix_ms, &self.kind)?;
        if computed != self.id {
            return Err(VellumError::InvalidEntry(format!(
                "entry {} hashes to {}",
                id_to_hex(&self.id),
                id_to_hex(&computed)
            )));
        }
        Ok(())
    }

    /// Snapshot path referenced by a commit entry
    pub fn snapshot_ref(&self) -> Option<&str> {
        match &self.kind {
            EntryKind::Commit { snapshot_ref, .. } => Some(snapshot_ref),
            _ => None,
        }
    }

    pub fn id_hex(&self) -> String {
        id_to_hex(&self.id)
    }
}

/// Current wall-clock time in Unix milliseconds
pub fn now_unix_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
