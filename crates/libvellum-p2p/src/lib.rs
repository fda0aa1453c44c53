//! Peer lifecycle, event bus and sync for vellum nodes

pub mod context;
pub mod error;
pub mod event;
pub mod network;
pub mod node;
pub mod peer;
pub mod sync;
pub mod transport;

pub use context::Context;
pub use error::P2pError;
pub use event::{Bus, Event, Payload, Subscription, Topic};
pub use network::Network;
pub use node::{Lifecycle, Node};
pub use peer::{Message, PeerId, PeerInfo, Profile};
pub use sync::{CloneResult, LogPull, SyncEngine};
pub use transport::{LogRef, LogSlice, Transport};
