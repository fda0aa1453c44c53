//! Append-only provenance logs
//!
//! A [`Logbook`] holds the totally ordered entries of one lineage. Entries are
//! hash-chained, so the id of the last entry identifies the whole history:
//! two peers holding identical histories compute the same [`Logbook::id`],
//! and any differing entry changes it. Only the author appends local writes;
//! other peers hold replicas that grow through [`Logbook::merge`].
//!
//! Deletion is modelled with tombstone entries. Nothing is ever truncated, so
//! a peer that replicated before a delete can still fast-forward after it.

pub mod book;
pub mod entry;
pub mod store;

use crate::error::VellumError;
use crate::types::ids::{id_to_hex, ActorId, EntryId, LineageId};

pub use book::Book;
pub use entry::{now_unix_ms, EntryKind, LogEntry};
pub use store::LogStore;

/// Entry sequence for one lineage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logbook {
    lineage: LineageId,
    name: String,
    author: ActorId,
    entries: Vec<LogEntry>,
}

impl Logbook {
    /// Start a new lineage for `name`
    pub fn init(actor: ActorId, name: &str) -> Result<Self, VellumError> {
        Self::init_at(actor, name, now_unix_ms())
    }

    /// Start a new lineage with an explicit timestamp
    pub fn init_at(actor: ActorId, name: &str, ts_unix_ms: u64) -> Result<Self, VellumError> {
        if name.is_empty() {
            return Err(VellumError::InvalidEntry("dataset name is empty".to_string()));
        }
        let kind = EntryKind::Init {
            name: name.to_string(),
            nonce: crate::types::ids::generate_nonce(),
        };
        let entry = LogEntry::new(None, actor, ts_unix_ms, kind)?;
        Ok(Self {
            lineage: LineageId::from_init_entry(&entry.id),
            name: name.to_string(),
            author: actor,
            entries: vec![entry],
        })
    }

    /// Rebuild a log from a complete, verified entry sequence
    pub fn from_entries(entries: Vec<LogEntry>) -> Result<Self, VellumError> {
        let first = entries
            .first()
            .ok_or_else(|| VellumError::InvalidEntry("log has no entries".to_string()))?;
        let name = match (&first.kind, first.prev) {
            (EntryKind::Init { name, .. }, None) => name.clone(),
            _ => {
                return Err(VellumError::InvalidEntry(
                    "log does not start with an init entry".to_string(),
                ))
            }
        };
        first.verify()?;

        let mut log = Self {
            lineage: LineageId::from_init_entry(&first.id),
            name,
            author: first.actor,
            entries: vec![first.clone()],
        };
        for entry in entries.into_iter().skip(1) {
            log.check_next(&entry)?;
            log.entries.push(entry);
        }
        Ok(log)
    }

    pub fn lineage_id(&self) -> &LineageId {
        &self.lineage
    }

    /// Deterministic id of the whole history: the id of the last entry
    pub fn id(&self) -> String {
        id_to_hex(&self.head().id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn author(&self) -> &ActorId {
        &self.author
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: a log holds at least its init entry
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Latest entry
    pub fn head(&self) -> &LogEntry {
        // entries is never empty once constructed
        &self.entries[self.entries.len() - 1]
    }

    /// Whether the lineage ended with a DeleteAll tombstone
    pub fn is_deleted(&self) -> bool {
        matches!(self.head().kind, EntryKind::DeleteAll)
    }

    /// Visible commits, newest first
    pub fn versions(&self) -> Vec<&LogEntry> {
        let mut visible: Vec<&LogEntry> = Vec::new();
        for entry in &self.entries {
            match entry.kind {
                EntryKind::Init { .. } => {}
                EntryKind::Commit { .. } => visible.push(entry),
                EntryKind::DeleteRevisions { count } => {
                    let keep = visible.len().saturating_sub(count);
                    visible.truncate(keep);
                }
                EntryKind::DeleteAll => visible.clear(),
            }
        }
        visible.reverse();
        visible
    }

    /// Number of commits not hidden by a tombstone
    pub fn visible_commit_count(&self) -> usize {
        self.versions().len()
    }

    /// Snapshot path of the latest visible commit
    pub fn head_ref(&self) -> Option<&str> {
        self.versions().into_iter().next().and_then(|e| e.snapshot_ref())
    }

    /// Append a commit referencing `snapshot_ref`
    pub fn commit(
        &mut self,
        actor: ActorId,
        snapshot_ref: &str,
        summary: &str,
    ) -> Result<&LogEntry, VellumError> {
        self.append(
            actor,
            EntryKind::Commit {
                snapshot_ref: snapshot_ref.to_string(),
                summary: summary.to_string(),
            },
        )
    }

    /// Hide the most recent `count` commits
    pub fn delete_revisions(&mut self, actor: ActorId, count: usize) -> Result<&LogEntry, VellumError> {
        self.check_writable(&actor)?;
        let available = self.visible_commit_count();
        if count == 0 || count > available {
            return Err(VellumError::InsufficientHistory {
                requested: count,
                available,
            });
        }
        self.append(actor, EntryKind::DeleteRevisions { count })
    }

    /// End the lineage
    pub fn delete_all(&mut self, actor: ActorId) -> Result<&LogEntry, VellumError> {
        self.append(actor, EntryKind::DeleteAll)
    }

    fn check_writable(&self, actor: &ActorId) -> Result<(), VellumError> {
        if self.is_deleted() {
            return Err(VellumError::UnknownLineage(format!(
                "{} ({} was deleted)",
                self.name, self.lineage
            )));
        }
        if *actor != self.author {
            return Err(VellumError::NotAuthor {
                actor: id_to_hex(actor),
                author: id_to_hex(&self.author),
            });
        }
        Ok(())
    }

    fn append(&mut self, actor: ActorId, kind: EntryKind) -> Result<&LogEntry, VellumError> {
        self.check_writable(&actor)?;
        // Keep timestamps monotonic within a log even if the clock steps back
        let ts = now_unix_ms().max(self.head().ts_unix_ms);
        let entry = LogEntry::new(Some(self.head().id), actor, ts, kind)?;
        self.entries.push(entry);
        Ok(self.head())
    }

    /// Validate that `entry` may follow the current head
    fn check_next(&self, entry: &LogEntry) -> Result<(), VellumError> {
        entry.verify()?;
        if entry.prev != Some(self.head().id) {
            return Err(VellumError::Divergence(format!(
                "entry {} does not follow {} in {}",
                entry.id_hex(),
                self.id(),
                self.lineage
            )));
        }
        if entry.actor != self.author {
            return Err(VellumError::Divergence(format!(
                "entry {} written by {} in a log authored by {}",
                entry.id_hex(),
                id_to_hex(&entry.actor),
                id_to_hex(&self.author)
            )));
        }
        if self.is_deleted() {
            return Err(VellumError::Divergence(format!(
                "entry {} follows the end of {}",
                entry.id_hex(),
                self.lineage
            )));
        }
        if matches!(entry.kind, EntryKind::Init { .. }) {
            return Err(VellumError::InvalidEntry(format!(
                "init entry {} in the middle of {}",
                entry.id_hex(),
                self.lineage
            )));
        }
        Ok(())
    }

    /// Position of an entry in this log
    pub fn position(&self, id: &EntryId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == *id)
    }

    /// Entries after `since`, or the whole log when `since` is `None`.
    /// Returns `None` if `since` is not part of this log.
    pub fn entries_since(&self, since: Option<&EntryId>) -> Option<&[LogEntry]> {
        match since {
            None => Some(&self.entries),
            Some(id) => self.position(id).map(|pos| &self.entries[pos + 1..]),
        }
    }

    /// Fast-forward a replica with entries from another copy of this lineage.
    ///
    /// Entries already present are skipped, the rest must extend the local
    /// head one by one. Each accepted entry is kept even if a later one is
    /// rejected, so a failed merge can simply be retried. Returns the
    /// number of entries appended.
    pub fn merge(&mut self, entries: &[LogEntry]) -> Result<usize, VellumError> {
        let mut appended = 0;
        for entry in entries {
            if let Some(pos) = self.position(&entry.id) {
                // Already-held entries must line up with our own history
                if self.entries[pos] != *entry {
                    return Err(VellumError::Divergence(format!(
                        "entry {} differs from local copy",
                        entry.id_hex()
                    )));
                }
                continue;
            }
            self.check_next(entry)?;
            self.entries.push(entry.clone());
            appended += 1;
        }
        Ok(appended)
    }

    /// Exact equality of two views of a lineage
    pub fn equal(&self, other: &Logbook) -> bool {
        self.id() == other.id() && self.visible_commit_count() == other.visible_commit_count()
    }
}
