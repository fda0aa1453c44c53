//! Log and snapshot sync with remote peers
//!
//! Logs and snapshot bodies move independently. A log-only pull makes the
//! local replica equal to the remote log without fetching any snapshot;
//! walking history on the replica then needs [`SyncEngine::pull_snapshots`].

use std::future::Future;
use std::sync::RwLock;

use libvellum_core::hash::compute_snapshot_path;
use libvellum_core::{Book, LineageId, Snapshot, SnapshotStore, StoreError, VellumError};
use tracing::{debug, info};

use crate::context::Context;
use crate::error::P2pError;
use crate::peer::PeerId;
use crate::transport::{LogRef, LogSlice, Transport};

/// Result of a log pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPull {
    /// Lineage now current for the name
    pub lineage: LineageId,
    /// Number of entries appended locally, across all merged lineages
    pub entries_pulled: usize,
    /// Remote log id at the time of the pull
    pub remote_head: String,
}

/// Result of a clone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneResult {
    pub log: LogPull,
    /// Head snapshot path, if the dataset has visible versions
    pub head_ref: Option<String>,
    pub snapshots_pulled: usize,
}

/// Pulls logbooks and snapshots through a [`Transport`], honoring one
/// cancellation context for every remote call
pub struct SyncEngine<T> {
    transport: T,
    ctx: Context,
}

impl<T: Transport> SyncEngine<T> {
    pub fn new(transport: T, ctx: &Context) -> Self {
        Self {
            transport,
            ctx: ctx.clone(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn guarded<F, R>(&self, fut: F) -> Result<R, P2pError>
    where
        F: Future<Output = Result<R, P2pError>>,
    {
        if self.ctx.is_cancelled() {
            return Err(P2pError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.ctx.cancelled() => Err(P2pError::Cancelled),
            result = fut => result,
        }
    }

    /// Fetch the remote log for `name` and append what the local book lacks.
    ///
    /// Re-pulling with nothing new on the remote appends nothing. When the
    /// remote has moved to a new lineage for the name, the tail of the
    /// replicated old lineage is pulled too, so its tombstone is not missed.
    pub async fn pull_logs(
        &self,
        book: &RwLock<Book>,
        peer: &PeerId,
        name: &str,
    ) -> Result<LogPull, P2pError> {
        let local = {
            let book = read(book)?;
            book.current(name)
                .ok()
                .map(|log| (log.lineage_id().clone(), log.head().id, *log.author() == *book.owner()))
        };
        let since = local.as_ref().map(|(_, head, _)| *head);

        debug!(peer = %peer, name = %name, "Pulling log");
        let slice = self
            .guarded(
                self.transport
                    .fetch_log(peer, &LogRef::Name(name.to_string()), since),
            )
            .await?;

        let mut entries_pulled = 0;
        if let Some((old, head, owned)) = local {
            if old != slice.lineage && !owned {
                let tail = match self
                    .guarded(
                        self.transport
                            .fetch_log(peer, &LogRef::Lineage(old.clone()), Some(head)),
                    )
                    .await
                {
                    Ok(tail) => tail,
                    // Our replica came from elsewhere; the remote never held it
                    Err(P2pError::Core(VellumError::UnknownLineage(_))) => {
                        return Err(VellumError::Divergence(format!(
                            "{} replicates {}, which {} does not hold (remote has {})",
                            name, old, peer, slice.lineage
                        ))
                        .into());
                    }
                    Err(e) => return Err(e),
                };
                entries_pulled += merge(book, &tail)?;
            }
        }
        entries_pulled += merge(book, &slice)?;

        info!(
            peer = %peer,
            name = %name,
            lineage = %slice.lineage,
            entries = entries_pulled,
            "Pulled log"
        );
        Ok(LogPull {
            lineage: slice.lineage,
            entries_pulled,
            remote_head: slice.head,
        })
    }

    /// Fetch snapshots missing from `store`, following `previous_path` from
    /// `from_path` until a locally present snapshot or the chain start.
    ///
    /// Fetched snapshots are verified against their paths and stored oldest
    /// first, so a present snapshot always has its ancestors present and an
    /// interrupted pull resumes where it stopped.
    pub async fn pull_snapshots<S>(
        &self,
        store: &S,
        peer: &PeerId,
        from_path: &str,
    ) -> Result<usize, P2pError>
    where
        S: SnapshotStore + ?Sized,
    {
        let mut missing: Vec<Snapshot> = Vec::new();
        let mut path = from_path.to_string();

        while !path.is_empty() && !store.has(&path)? {
            let snapshot = self
                .guarded(self.transport.fetch_snapshot(peer, &path))
                .await?;
            let computed = compute_snapshot_path(&snapshot)?;
            if computed != path {
                return Err(StoreError::Corrupt {
                    expected: path,
                    computed,
                }
                .into());
            }
            debug!(peer = %peer, path = %path, "Fetched snapshot");
            path = snapshot.previous_path.clone();
            missing.push(snapshot);
        }

        let fetched = missing.len();
        for snapshot in missing.iter().rev() {
            store.put(snapshot)?;
        }
        if fetched > 0 {
            info!(peer = %peer, from = %from_path, snapshots = fetched, "Pulled snapshots");
        }
        Ok(fetched)
    }

    /// Pull the log for `name`, then every snapshot behind its head
    pub async fn clone_dataset<S>(
        &self,
        book: &RwLock<Book>,
        store: &S,
        peer: &PeerId,
        name: &str,
    ) -> Result<CloneResult, P2pError>
    where
        S: SnapshotStore + ?Sized,
    {
        let log = self.pull_logs(book, peer, name).await?;
        let head_ref = {
            let book = read(book)?;
            book.lineage(&log.lineage).and_then(|l| l.head_ref().map(str::to_string))
        };
        let snapshots_pulled = match &head_ref {
            Some(head) => self.pull_snapshots(store, peer, head).await?,
            None => 0,
        };
        Ok(CloneResult {
            log,
            head_ref,
            snapshots_pulled,
        })
    }
}

fn read(book: &RwLock<Book>) -> Result<std::sync::RwLockReadGuard<'_, Book>, P2pError> {
    book.read()
        .map_err(|_| P2pError::Core(VellumError::Internal("book lock poisoned".to_string())))
}

fn merge(book: &RwLock<Book>, slice: &LogSlice) -> Result<usize, P2pError> {
    let mut book = book
        .write()
        .map_err(|_| P2pError::Core(VellumError::Internal("book lock poisoned".to_string())))?;
    Ok(book.merge_remote(&slice.lineage, &slice.entries)?.appended)
}
