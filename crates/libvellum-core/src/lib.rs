pub mod types;
pub mod hash;
pub mod revision;
pub mod store;
pub mod resolve;
pub mod walk;
pub mod logbook;
pub mod config;
pub mod error;

pub use error::{StoreError, VellumError};
pub use types::{ActorId, EntryId, LineageId};
pub use types::snapshot::Snapshot;
pub use revision::{parse_selectors, Field, RevisionSelector};
pub use store::{MemoryStore, SledStore, SnapshotStore};
pub use resolve::{AliasResolver, ConcretePaths};
pub use walk::{drop_components, recall, walk, ResolvedDataset};
pub use logbook::{Book, EntryKind, LogEntry, LogStore, Logbook};
pub use logbook::book::MergeOutcome;
pub use config::{load_node_config, save_node_config, NodeConfig, P2pConfig};
