use std::path::Path;

use super::{seal, SnapshotStore};
use crate::error::StoreError;
use crate::types::snapshot::Snapshot;

/// Snapshot store backed by sled
pub struct SledStore {
    db: sled::Db,
    snapshots: sled::Tree,
}

impl SledStore {
    /// Open or create a store at the given path
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let snapshots = db.open_tree("snapshots")?;
        Ok(Self { db, snapshots })
    }

    /// Number of stored snapshots
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl SnapshotStore for SledStore {
    fn get(&self, path: &str) -> Result<Snapshot, StoreError> {
        match self.snapshots.get(path.as_bytes())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Err(StoreError::NotFound(path.to_string())),
        }
    }

    fn put(&self, snapshot: &Snapshot) -> Result<String, StoreError> {
        let sealed = seal(snapshot)?;
        let json = serde_json::to_vec(&sealed)?;
        // Same content hashes to the same key, so overwriting is a no-op
        self.snapshots.insert(sealed.path.as_bytes(), json)?;
        Ok(sealed.path)
    }

    fn has(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.snapshots.contains_key(path.as_bytes())?)
    }

    fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.snapshots.remove(path.as_bytes())?;
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::snapshot::Readme;
    use tempfile::tempdir;

    #[test]
    fn test_sled_store_persists() {
        let dir = tempdir().unwrap();
        let snapshot = Snapshot {
            readme: Some(Readme {
                format: "md".to_string(),
                text: "# hello".to_string(),
            }),
            ..Default::default()
        };

        let path = {
            let store = SledStore::open(dir.path()).unwrap();
            let path = store.put(&snapshot).unwrap();
            store.put(&snapshot).unwrap();
            assert_eq!(store.len(), 1);
            store.flush().unwrap();
            path
        };

        let store = SledStore::open(dir.path()).unwrap();
        let loaded = store.get(&path).unwrap();
        assert_eq!(loaded.readme, snapshot.readme);
        assert!(matches!(
            store.get("/blake2b/nope").unwrap_err(),
            StoreError::NotFound(_)
        ));
    }
}
