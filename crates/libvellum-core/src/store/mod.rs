//! Content-addressed snapshot storage
//!
//! Stores accept a snapshot, assign it the hash of its content as its path,
//! and hand it back unchanged on `get`. Two implementations ship: an in-memory
//! map for tests and replicas, and a sled-backed store for durable peers.

mod sled_store;

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StoreError;
use crate::hash::compute_snapshot_path;
use crate::types::snapshot::Snapshot;

pub use sled_store::SledStore;

/// Snapshot storage as seen by the chain walker and the sync engine
pub trait SnapshotStore: Send + Sync {
    /// Load the snapshot at `path`, or `StoreError::NotFound`
    fn get(&self, path: &str) -> Result<Snapshot, StoreError>;

    /// Store a snapshot and return its content path
    fn put(&self, snapshot: &Snapshot) -> Result<String, StoreError>;

    /// Whether a snapshot is present locally
    fn has(&self, path: &str) -> Result<bool, StoreError>;

    /// Remove a snapshot (explicit dataset deletion only)
    fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// Make stored snapshots durable
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

impl<S: SnapshotStore + ?Sized> SnapshotStore for std::sync::Arc<S> {
    fn get(&self, path: &str) -> Result<Snapshot, StoreError> {
        (**self).get(path)
    }

    fn put(&self, snapshot: &Snapshot) -> Result<String, StoreError> {
        (**self).put(snapshot)
    }

    fn has(&self, path: &str) -> Result<bool, StoreError> {
        (**self).has(path)
    }

    fn delete(&self, path: &str) -> Result<(), StoreError> {
        (**self).delete(path)
    }

    fn flush(&self) -> Result<(), StoreError> {
        (**self).flush()
    }
}

/// Assign a snapshot its content path, rejecting a stale or forged one
pub fn seal(snapshot: &Snapshot) -> Result<Snapshot, StoreError> {
    let computed = compute_snapshot_path(snapshot)?;
    if !snapshot.path.is_empty() && snapshot.path != computed {
        return Err(StoreError::Corrupt {
            expected: snapshot.path.clone(),
            computed,
        });
    }
    Ok(Snapshot {
        path: computed,
        ..snapshot.clone()
    })
}

/// In-memory snapshot store
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshots: RwLock<HashMap<String, Snapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots
    pub fn len(&self) -> usize {
        self.snapshots.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotStore for MemoryStore {
    fn get(&self, path: &str) -> Result<Snapshot, StoreError> {
        let snapshots = self.snapshots.read().map_err(|_| StoreError::Poisoned)?;
        snapshots
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn put(&self, snapshot: &Snapshot) -> Result<String, StoreError> {
        let sealed = seal(snapshot)?;
        let path = sealed.path.clone();
        let mut snapshots = self.snapshots.write().map_err(|_| StoreError::Poisoned)?;
        snapshots.entry(path.clone()).or_insert(sealed);
        Ok(path)
    }

    fn has(&self, path: &str) -> Result<bool, StoreError> {
        let snapshots = self.snapshots.read().map_err(|_| StoreError::Poisoned)?;
        Ok(snapshots.contains_key(path))
    }

    fn delete(&self, path: &str) -> Result<(), StoreError> {
        let mut snapshots = self.snapshots.write().map_err(|_| StoreError::Poisoned)?;
        snapshots.remove(path);
        Ok(())
    }
}
