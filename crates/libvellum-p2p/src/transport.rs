use std::fmt;
use std::future::Future;

use libvellum_core::{EntryId, LineageId, LogEntry, Snapshot};
use serde::{Deserialize, Serialize};

use crate::error::P2pError;
use crate::peer::PeerId;

/// Which remote log to fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogRef {
    /// Newest lineage recorded under a dataset name, live or deleted
    Name(String),
    Lineage(LineageId),
}

impl fmt::Display for LogRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogRef::Name(name) => f.write_str(name),
            LogRef::Lineage(id) => write!(f, "lineage {}", id),
        }
    }
}

/// Entries of one remote lineage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSlice {
    pub lineage: LineageId,
    pub name: String,
    /// Remote log id at the time of the fetch
    pub head: String,
    /// Entries after the requested `since`, or the whole log when `since`
    /// is absent or unknown to the remote
    pub entries: Vec<LogEntry>,
}

/// Peer-addressed fetches used by the sync engine. Retries, if any, belong
/// to the implementation.
pub trait Transport: Send + Sync {
    fn fetch_log(
        &self,
        peer: &PeerId,
        reference: &LogRef,
        since: Option<EntryId>,
    ) -> impl Future<Output = Result<LogSlice, P2pError>> + Send;

    fn fetch_snapshot(
        &self,
        peer: &PeerId,
        path: &str,
    ) -> impl Future<Output = Result<Snapshot, P2pError>> + Send;
}
