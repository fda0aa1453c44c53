use std::path::Path;

use super::entry::LogEntry;
use super::Logbook;
use crate::error::VellumError;
use crate::types::ids::{EntryId, LineageId};

/// Durable, append-only storage for logbook entries backed by sled
///
/// Entries are keyed by `(lineage, seq)` so a prefix scan returns one
/// lineage in log order. The `lineages` tree records the order in which
/// lineages were first seen, keyed by a monotonic sequence number.
pub struct LogStore {
    db: sled::Db,
    entries: sled::Tree,
    lineages: sled::Tree,
}

impl LogStore {
    /// Open or create a store at the given path
    pub fn open(path: &Path) -> Result<Self, VellumError> {
        let db = sled::open(path)?;
        let entries = db.open_tree("entries")?;
        let lineages = db.open_tree("lineages")?;
        Ok(Self {
            db,
            entries,
            lineages,
        })
    }

    /// Record a lineage the first time it is stored
    pub fn register_lineage(&self, lineage: &LineageId) -> Result<(), VellumError> {
        let id = lineage.to_bytes()?;
        for result in self.lineages.iter() {
            let (_, value) = result?;
            if value.as_ref() == id.as_slice() {
                return Ok(());
            }
        }
        let seq = self.db.generate_id()?;
        self.lineages.insert(seq.to_be_bytes(), id.as_slice())?;
        Ok(())
    }

    /// Append one entry at position `seq` of its lineage
    pub fn append_entry(
        &self,
        lineage: &LineageId,
        seq: usize,
        entry: &LogEntry,
    ) -> Result<(), VellumError> {
        let key = entry_key(&lineage.to_bytes()?, seq as u64);
        let json = serde_json::to_vec(entry)?;
        self.entries.insert(key, json)?;
        Ok(())
    }

    /// Persist every entry of `log` from position `from` onwards
    pub fn append_from(&self, log: &Logbook, from: usize) -> Result<(), VellumError> {
        self.register_lineage(log.lineage_id())?;
        for (seq, entry) in log.entries().iter().enumerate().skip(from) {
            self.append_entry(log.lineage_id(), seq, entry)?;
        }
        Ok(())
    }

    /// Load every stored lineage, in the order they were first stored
    pub fn load_all(&self) -> Result<Vec<Logbook>, VellumError> {
        let mut logs = Vec::new();
        for result in self.lineages.iter() {
            let (_, value) = result?;
            let lineage: EntryId = value
                .as_ref()
                .try_into()
                .map_err(|_| VellumError::Internal("malformed lineage key".to_string()))?;

            let mut entries = Vec::new();
            for item in self.entries.scan_prefix(lineage) {
                let (_, bytes) = item?;
                let entry: LogEntry = serde_json::from_slice(&bytes)?;
                entries.push(entry);
            }
            logs.push(Logbook::from_entries(entries)?);
        }
        Ok(logs)
    }

    /// Number of stored entries across all lineages
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<(), VellumError> {
        self.db.flush()?;
        Ok(())
    }
}

fn entry_key(lineage: &EntryId, seq: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(40);
    key.extend_from_slice(lineage);
    key.extend_from_slice(&seq.to_be_bytes());
    key
}
