use super::entry::LogEntry;
use super::store::LogStore;
use super::Logbook;
use crate::error::VellumError;
use crate::resolve::{is_concrete_path, AliasResolver};
use crate::types::ids::{id_to_hex, ActorId, EntryId, LineageId};

/// Result of merging remote entries into a book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub lineage: LineageId,
    /// Entries appended locally
    pub appended: usize,
    /// Whether the lineage was new to this book
    pub created: bool,
}

/// All logbooks held by one peer: the ones it authors and replicas of
/// other peers' logs. Retired (deleted) lineages stay in the book, so a
/// name can map to several lineages over time; only the newest live one
/// is current.
pub struct Book {
    owner: ActorId,
    logs: Vec<Logbook>,
    store: Option<LogStore>,
}

impl Book {
    /// In-memory book owned by `owner`
    pub fn new(owner: ActorId) -> Self {
        Self {
            owner,
            logs: Vec::new(),
            store: None,
        }
    }

    /// Book persisted in `store`, reloading whatever it already holds
    pub fn open(owner: ActorId, store: LogStore) -> Result<Self, VellumError> {
        let logs = store.load_all()?;
        Ok(Self {
            owner,
            logs,
            store: Some(store),
        })
    }

    pub fn owner(&self) -> &ActorId {
        &self.owner
    }

    /// Every lineage held, in the order it was added
    pub fn logs(&self) -> &[Logbook] {
        &self.logs
    }

    /// Start a lineage for `name`, failing if a live one already exists
    pub fn init(&mut self, name: &str) -> Result<LineageId, VellumError> {
        if let Some(existing) = self.find_current(name) {
            return Err(VellumError::LineageExists(format!(
                "{} ({})",
                name,
                existing.lineage_id()
            )));
        }
        let log = Logbook::init(self.owner, name)?;
        let lineage = log.lineage_id().clone();
        self.logs.push(log);
        self.persist(self.logs.len() - 1, 0)?;
        Ok(lineage)
    }

    /// Record a commit on the current lineage of `name`
    pub fn commit(
        &mut self,
        name: &str,
        snapshot_ref: &str,
        summary: &str,
    ) -> Result<EntryId, VellumError> {
        let owner = self.owner;
        self.write(name, |log| Ok(log.commit(owner, snapshot_ref, summary)?.id))
    }

    /// Hide the most recent `count` commits of `name`
    pub fn delete_revisions(&mut self, name: &str, count: usize) -> Result<EntryId, VellumError> {
        let owner = self.owner;
        self.write(name, |log| Ok(log.delete_revisions(owner, count)?.id))
    }

    /// End the current lineage of `name`
    pub fn delete_all(&mut self, name: &str) -> Result<EntryId, VellumError> {
        let owner = self.owner;
        self.write(name, |log| Ok(log.delete_all(owner)?.id))
    }

    fn write<F>(&mut self, name: &str, op: F) -> Result<EntryId, VellumError>
    where
        F: FnOnce(&mut Logbook) -> Result<EntryId, VellumError>,
    {
        let index = self
            .current_index(name)
            .ok_or_else(|| VellumError::UnknownLineage(name.to_string()))?;
        let before = self.logs[index].len();
        let id = op(&mut self.logs[index])?;
        self.persist(index, before)?;
        Ok(id)
    }

    fn persist(&self, index: usize, from: usize) -> Result<(), VellumError> {
        if let Some(store) = &self.store {
            store.append_from(&self.logs[index], from)?;
        }
        Ok(())
    }

    fn current_index(&self, name: &str) -> Option<usize> {
        self.logs
            .iter()
            .rposition(|log| log.name() == name && !log.is_deleted())
    }

    fn find_current(&self, name: &str) -> Option<&Logbook> {
        self.current_index(name).map(|i| &self.logs[i])
    }

    /// Current (live) lineage for `name`
    pub fn current(&self, name: &str) -> Result<&Logbook, VellumError> {
        self.find_current(name)
            .ok_or_else(|| VellumError::UnknownLineage(name.to_string()))
    }

    /// Newest lineage for `name`, live or deleted
    pub fn latest(&self, name: &str) -> Option<&Logbook> {
        self.logs.iter().rev().find(|log| log.name() == name)
    }

    /// Every lineage ever recorded under `name`, oldest first
    pub fn lineages_for(&self, name: &str) -> Vec<&Logbook> {
        self.logs.iter().filter(|log| log.name() == name).collect()
    }

    pub fn lineage(&self, id: &LineageId) -> Option<&Logbook> {
        self.logs.iter().find(|log| log.lineage_id() == id)
    }

    /// Visible commits of the current lineage, newest first
    pub fn versions(&self, name: &str) -> Result<Vec<&LogEntry>, VellumError> {
        Ok(self.current(name)?.versions())
    }

    /// Snapshot path of the latest visible commit of `name`
    pub fn head_ref(&self, name: &str) -> Result<String, VellumError> {
        let log = self.current(name)?;
        log.head_ref()
            .map(str::to_string)
            .ok_or_else(|| VellumError::UnknownLineage(format!("{} has no visible versions", name)))
    }

    /// Merge entries pulled from another peer into the matching lineage.
    ///
    /// A lineage not yet held is created from the entries, which must then
    /// form a complete log. A lineage this book authors is never replaced by
    /// a foreign one of the same name.
    pub fn merge_remote(
        &mut self,
        lineage: &LineageId,
        entries: &[LogEntry],
    ) -> Result<MergeOutcome, VellumError> {
        if let Some(index) = self.logs.iter().position(|log| log.lineage_id() == lineage) {
            let before = self.logs[index].len();
            let result = self.logs[index].merge(entries);
            // Keep whatever was accepted before a rejection
            self.persist(index, before)?;
            let appended = result?;
            return Ok(MergeOutcome {
                lineage: lineage.clone(),
                appended,
                created: false,
            });
        }

        let log = Logbook::from_entries(entries.to_vec())?;
        if log.lineage_id() != lineage {
            return Err(VellumError::Divergence(format!(
                "remote sent lineage {} when asked for {}",
                log.lineage_id(),
                lineage
            )));
        }
        if let Some(existing) = self.find_current(log.name()) {
            if *existing.author() == self.owner {
                return Err(VellumError::Divergence(format!(
                    "{} is authored locally as {}, remote has {}",
                    log.name(),
                    existing.lineage_id(),
                    lineage
                )));
            }
        }

        let appended = log.len();
        self.logs.push(log);
        self.persist(self.logs.len() - 1, 0)?;
        Ok(MergeOutcome {
            lineage: lineage.clone(),
            appended,
            created: true,
        })
    }

    /// Whether this book authored the lineage
    pub fn is_owned(&self, lineage: &LineageId) -> bool {
        self.lineage(lineage)
            .map(|log| *log.author() == self.owner)
            .unwrap_or(false)
    }

    /// Flush the backing log store, if any
    pub fn flush(&self) -> Result<(), VellumError> {
        match &self.store {
            Some(store) => store.flush(),
            None => Ok(()),
        }
    }

    pub fn owner_hex(&self) -> String {
        id_to_hex(&self.owner)
    }
}

impl AliasResolver for Book {
    fn canonicalize(&self, reference: &str) -> Result<String, VellumError> {
        if is_concrete_path(reference) {
            return Ok(reference.to_string());
        }
        self.head_ref(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const NASIM: ActorId = [1u8; 16];
    const HINSHUN: ActorId = [2u8; 16];

    #[test]
    fn test_log_and_deletes() {
        let mut book = Book::new(NASIM);
        book.init("nasim/log_test").unwrap();
        book.commit("nasim/log_test", "/blake2b/v1", "created dataset").unwrap();
        assert_eq!(book.versions("nasim/log_test").unwrap().len(), 1);

        book.commit("nasim/log_test", "/blake2b/v2", "body added rows").unwrap();
        let versions = book.versions("nasim/log_test").unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].snapshot_ref(), Some("/blake2b/v2"));

        book.delete_revisions("nasim/log_test", 1).unwrap();
        assert_eq!(book.head_ref("nasim/log_test").unwrap(), "/blake2b/v1");
        // init, 2 commits, delete
        assert_eq!(book.current("nasim/log_test").unwrap().len(), 4);

        let old = book.current("nasim/log_test").unwrap().lineage_id().clone();
        book.delete_all("nasim/log_test").unwrap();
        assert!(book.current("nasim/log_test").is_err());

        let new = book.init("nasim/log_test").unwrap();
        book.commit("nasim/log_test", "/blake2b/v3", "created from csv").unwrap();
        assert_ne!(old, new);

        let versions = book.versions("nasim/log_test").unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].snapshot_ref(), Some("/blake2b/v3"));

        let lineages = book.lineages_for("nasim/log_test");
        assert_eq!(lineages.len(), 2);
        assert!(lineages[0].is_deleted());
        assert_eq!(lineages[1].len(), 2);
    }

    #[test]
    fn test_writes_to_unknown_lineage_fail() {
        let mut book = Book::new(NASIM);
        let err = book.commit("nasim/missing", "/blake2b/v1", "x").unwrap_err();
        assert!(matches!(err, VellumError::UnknownLineage(_)));
        assert!(matches!(
            book.delete_all("nasim/missing").unwrap_err(),
            VellumError::UnknownLineage(_)
        ));
    }

    #[test]
    fn test_init_twice_conflicts() {
        let mut book = Book::new(NASIM);
        book.init("nasim/ds").unwrap();
        assert!(matches!(
            book.init("nasim/ds").unwrap_err(),
            VellumError::LineageExists(_)
        ));
    }

    #[test]
    fn test_replicas_are_read_only() {
        let mut origin = Book::new(NASIM);
        let lineage = origin.init("nasim/ds").unwrap();
        origin.commit("nasim/ds", "/blake2b/v1", "one").unwrap();

        let mut replica = Book::new(HINSHUN);
        let entries = origin.current("nasim/ds").unwrap().entries().to_vec();
        let outcome = replica.merge_remote(&lineage, &entries).unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.appended, 2);
        assert!(!replica.is_owned(&lineage));

        let err = replica.commit("nasim/ds", "/blake2b/v2", "two").unwrap_err();
        assert!(matches!(err, VellumError::NotAuthor { .. }));
        assert!(replica
            .current("nasim/ds")
            .unwrap()
            .equal(origin.current("nasim/ds").unwrap()));
    }

    #[test]
    fn test_resolver_uses_head() {
        let mut book = Book::new(NASIM);
        book.init("nasim/ds").unwrap();
        assert!(book.canonicalize("nasim/ds").is_err());
        book.commit("nasim/ds", "/blake2b/v1", "one").unwrap();
        assert_eq!(book.canonicalize("nasim/ds").unwrap(), "/blake2b/v1");
        assert_eq!(book.canonicalize("/blake2b/other").unwrap(), "/blake2b/other");
    }

    #[test]
    fn test_book_reopens_from_store() {
        let dir = tempdir().unwrap();
        let id = {
            let mut book = Book::open(NASIM, LogStore::open(dir.path()).unwrap()).unwrap();
            book.init("nasim/ds").unwrap();
            book.commit("nasim/ds", "/blake2b/v1", "one").unwrap();
            book.delete_all("nasim/ds").unwrap();
            book.init("nasim/ds").unwrap();
            book.commit("nasim/ds", "/blake2b/v2", "two").unwrap();
            book.current("nasim/ds").unwrap().id()
        };

        let book = Book::open(NASIM, LogStore::open(dir.path()).unwrap()).unwrap();
        assert_eq!(book.logs().len(), 2);
        assert_eq!(book.current("nasim/ds").unwrap().id(), id);
        assert_eq!(book.head_ref("nasim/ds").unwrap(), "/blake2b/v2");
    }
}
