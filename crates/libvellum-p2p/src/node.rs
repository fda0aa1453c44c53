//! Peer lifecycle
//!
//! A node is `Offline` until [`Node::go_online`] registers it with the
//! [`Network`]. Going online or offline holds the node's transition lock
//! from the state change until its event is published, so transitions never
//! interleave and subscribers observe them in the order they took effect.
//! Connection state lives behind a separate mutex that is only held briefly.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use libvellum_core::config::{load_node_config, save_node_config};
use libvellum_core::types::id_to_hex;
use libvellum_core::{
    Book, EntryId, LogStore, MemoryStore, NodeConfig, SledStore, Snapshot, SnapshotStore,
    VellumError,
};
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::error::P2pError;
use crate::event::{Bus, Event, Payload, Topic};
use crate::network::Network;
use crate::peer::{Message, PeerId, PeerInfo, Profile};
use crate::transport::{LogRef, LogSlice, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Offline,
    Online,
}

struct Connection {
    info: PeerInfo,
    participant: Option<Profile>,
}

struct NodeState {
    lifecycle: Lifecycle,
    addrs: Vec<String>,
    peers: HashMap<PeerId, Connection>,
}

pub(crate) struct NodeShared {
    pub(crate) id: PeerId,
    profile: Profile,
    enabled: bool,
    bus: Bus,
    book: Arc<RwLock<Book>>,
    store: Arc<dyn SnapshotStore>,
    /// Serializes go_online and go_offline
    transition: tokio::sync::Mutex<()>,
    state: Mutex<NodeState>,
}

impl NodeShared {
    fn lock(&self) -> std::sync::MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_online(&self) -> bool {
        self.lock().lifecycle == Lifecycle::Online
    }

    fn peer_info(&self) -> PeerInfo {
        PeerInfo {
            id: self.id.clone(),
            addrs: self.lock().addrs.clone(),
        }
    }

    fn publish(&self, topic: Topic, payload: Payload) {
        self.bus.publish(Event::new(topic, payload));
    }

    /// Record a transport connection. False if already connected or offline.
    fn attach(&self, info: PeerInfo) -> bool {
        let mut state = self.lock();
        if state.lifecycle == Lifecycle::Offline || state.peers.contains_key(&info.id) {
            return false;
        }
        debug!(peer = %self.id, remote = %info.id, "Peer connected");
        state.peers.insert(
            info.id.clone(),
            Connection {
                info: info.clone(),
                participant: None,
            },
        );
        self.publish(Topic::PeerConnected, Payload::Peer(info));
        true
    }

    /// Mark a connected peer as a protocol participant
    fn admit(&self, profile: Profile) -> bool {
        let mut state = self.lock();
        let Some(conn) = state.peers.get_mut(&profile.peer_id) else {
            return false;
        };
        if conn.participant.is_some() {
            return false;
        }
        conn.participant = Some(profile.clone());
        self.publish(Topic::QriPeerConnected, Payload::Participant(profile));
        true
    }

    /// Drop a connection, if present
    fn detach(&self, peer: &PeerId) -> bool {
        let mut state = self.lock();
        match state.peers.remove(peer) {
            Some(conn) => {
                self.announce_disconnect(conn);
                true
            }
            None => false,
        }
    }

    fn announce_disconnect(&self, conn: Connection) {
        debug!(peer = %self.id, remote = %conn.info.id, "Peer disconnected");
        if let Some(profile) = conn.participant {
            self.publish(Topic::QriPeerDisconnected, Payload::Participant(profile));
        }
        self.publish(Topic::PeerDisconnected, Payload::Peer(conn.info));
    }

    fn is_connected(&self, peer: &PeerId) -> bool {
        self.lock().peers.contains_key(peer)
    }

    fn deliver(&self, message: Message) -> Result<(), P2pError> {
        let state = self.lock();
        if !state.peers.contains_key(&message.from) {
            return Err(P2pError::NotConnected(message.from.to_string()));
        }
        debug!(peer = %self.id, from = %message.from, kind = %message.kind, "Message received");
        self.publish(Topic::MessageReceived, Payload::Message(message));
        Ok(())
    }

    fn read_book(&self) -> Result<RwLockReadGuard<'_, Book>, P2pError> {
        self.book
            .read()
            .map_err(|_| P2pError::Core(VellumError::Internal("book lock poisoned".to_string())))
    }

    fn serve_log(&self, reference: &LogRef, since: Option<&EntryId>) -> Result<LogSlice, P2pError> {
        let book = self.read_book()?;
        let log = match reference {
            LogRef::Name(name) => book.latest(name),
            LogRef::Lineage(id) => book.lineage(id),
        }
        .ok_or_else(|| VellumError::UnknownLineage(reference.to_string()))?;

        let entries = log.entries_since(since).unwrap_or(log.entries());
        debug!(peer = %self.id, log = %reference, entries = entries.len(), "Serving log");
        Ok(LogSlice {
            lineage: log.lineage_id().clone(),
            name: log.name().to_string(),
            head: log.id(),
            entries: entries.to_vec(),
        })
    }

    fn serve_snapshot(&self, path: &str) -> Result<Snapshot, P2pError> {
        debug!(peer = %self.id, path = %path, "Serving snapshot");
        Ok(self.store.get(path)?)
    }
}

/// A vellum peer: identity, event bus, logbooks and snapshot store, plus its
/// place on the network
#[derive(Clone)]
pub struct Node {
    shared: Arc<NodeShared>,
    network: Network,
}

impl Node {
    /// Node for `config`, publishing on a bus bound to `ctx`
    pub fn new(
        network: &Network,
        ctx: &Context,
        config: &NodeConfig,
        book: Arc<RwLock<Book>>,
        store: Arc<dyn SnapshotStore>,
    ) -> Result<Self, P2pError> {
        let actor = config.actor()?;
        {
            let book = book
                .read()
                .map_err(|_| VellumError::Internal("book lock poisoned".to_string()))?;
            if *book.owner() != actor {
                return Err(VellumError::NotAuthor {
                    actor: config.actor_id.clone(),
                    author: book.owner_hex(),
                }
                .into());
            }
        }

        let id = PeerId::random();
        let profile = Profile {
            peer_id: id.clone(),
            peername: config.peername.clone(),
            actor_id: id_to_hex(&actor),
            protocol_id: config.p2p.protocol_id.clone(),
        };
        Ok(Self {
            shared: Arc::new(NodeShared {
                id,
                profile,
                enabled: config.p2p.enabled,
                bus: Bus::new(ctx, config.p2p.bus_capacity),
                book,
                store,
                transition: tokio::sync::Mutex::new(()),
                state: Mutex::new(NodeState {
                    lifecycle: Lifecycle::Offline,
                    addrs: Vec::new(),
                    peers: HashMap::new(),
                }),
            }),
            network: network.clone(),
        })
    }

    /// Node with a fresh actor and in-memory storage
    pub fn in_memory(network: &Network, ctx: &Context, peername: &str) -> Result<Self, P2pError> {
        Self::with_config(network, ctx, &NodeConfig::generate(peername))
    }

    /// Node with in-memory storage for an existing config
    pub fn with_config(network: &Network, ctx: &Context, config: &NodeConfig) -> Result<Self, P2pError> {
        let book = Book::new(config.actor()?);
        Self::new(
            network,
            ctx,
            config,
            Arc::new(RwLock::new(book)),
            Arc::new(MemoryStore::new()),
        )
    }

    /// Node persisted under `node_dir`, creating its config on first use
    pub fn open(network: &Network, ctx: &Context, node_dir: &Path, peername: &str) -> Result<Self, P2pError> {
        let config = match load_node_config(node_dir)? {
            Some(config) => config,
            None => {
                let config = NodeConfig::generate(peername);
                save_node_config(node_dir, &config)?;
                info!(dir = %node_dir.display(), actor = %config.actor_id, "Created node config");
                config
            }
        };
        let store_dir = config.store_dir(node_dir);
        let book = Book::open(config.actor()?, LogStore::open(&store_dir.join("logs"))?)?;
        let store = SledStore::open(&store_dir.join("snapshots"))?;
        Self::new(
            network,
            ctx,
            &config,
            Arc::new(RwLock::new(book)),
            Arc::new(store),
        )
    }

    pub fn id(&self) -> &PeerId {
        &self.shared.id
    }

    pub fn profile(&self) -> &Profile {
        &self.shared.profile
    }

    pub fn bus(&self) -> &Bus {
        &self.shared.bus
    }

    pub fn book(&self) -> &Arc<RwLock<Book>> {
        &self.shared.book
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.shared.store
    }

    /// Shared read access to the node's logbooks
    pub fn read_book(&self) -> Result<RwLockReadGuard<'_, Book>, P2pError> {
        self.shared.read_book()
    }

    /// Exclusive access to the node's logbooks for local writes
    pub fn write_book(&self) -> Result<RwLockWriteGuard<'_, Book>, P2pError> {
        self.shared
            .book
            .write()
            .map_err(|_| P2pError::Core(VellumError::Internal("book lock poisoned".to_string())))
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.lock().lifecycle
    }

    pub fn is_online(&self) -> bool {
        self.shared.is_online()
    }

    pub fn listen_addrs(&self) -> Vec<String> {
        self.shared.lock().addrs.clone()
    }

    /// Transport-level connections
    pub fn connected_peers(&self) -> Vec<PeerInfo> {
        let mut peers: Vec<PeerInfo> = self
            .shared
            .lock()
            .peers
            .values()
            .map(|c| c.info.clone())
            .collect();
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        peers
    }

    /// Connected peers that completed the protocol handshake
    pub fn participants(&self) -> Vec<Profile> {
        let mut profiles: Vec<Profile> = self
            .shared
            .lock()
            .peers
            .values()
            .filter_map(|c| c.participant.clone())
            .collect();
        profiles.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        profiles
    }

    /// Start listening and announce the listen addresses.
    ///
    /// The node is Online when this returns. Calling it on an online node
    /// returns the current addresses without a new event.
    pub async fn go_online(&self, ctx: &Context) -> Result<Vec<String>, P2pError> {
        if !self.shared.enabled {
            return Err(P2pError::Disabled);
        }
        if ctx.is_cancelled() {
            return Err(P2pError::Cancelled);
        }

        let _transition = self.shared.transition.lock().await;
        let mut state = self.shared.lock();
        if state.lifecycle == Lifecycle::Online {
            return Ok(state.addrs.clone());
        }
        let addrs = vec![self.shared.id.memory_addr()];
        state.lifecycle = Lifecycle::Online;
        state.addrs = addrs.clone();
        self.network.listen(&self.shared);
        info!(peer = %self.shared.id, addrs = ?addrs, "Node online");
        self.shared
            .publish(Topic::GoneOnline, Payload::ListenAddrs(addrs.clone()));
        Ok(addrs)
    }

    /// Stop listening, disconnect every peer and announce going offline.
    /// A no-op when already offline.
    pub async fn go_offline(&self) -> Result<(), P2pError> {
        let _transition = self.shared.transition.lock().await;
        let peers = {
            let mut state = self.shared.lock();
            if state.lifecycle == Lifecycle::Offline {
                return Ok(());
            }
            state.lifecycle = Lifecycle::Offline;
            state.addrs.clear();
            self.network.unlisten(&self.shared.id);
            std::mem::take(&mut state.peers)
        };

        let count = peers.len();
        for (id, conn) in peers {
            self.shared.announce_disconnect(conn);
            if let Some(remote) = self.network.dial(&id) {
                remote.detach(&self.shared.id);
            }
        }

        if let Err(e) = self.shared.store.flush() {
            warn!("Failed to flush snapshot store: {}", e);
        }
        match self.shared.book.read() {
            Ok(book) => {
                if let Err(e) = book.flush() {
                    warn!("Failed to flush log store: {}", e);
                }
            }
            Err(_) => warn!("Book lock poisoned, log store not flushed"),
        }

        self.shared.publish(Topic::GoneOffline, Payload::None);
        info!(peer = %self.shared.id, disconnected = count, "Node offline");
        Ok(())
    }

    /// Open a connection to `peer` and run the protocol handshake.
    ///
    /// Both sides see PeerConnected. If the remote speaks the same
    /// protocol both sides then see QriPeerConnected; otherwise the
    /// transport connection stays up and `HandshakeFailed` is returned.
    pub async fn connect(&self, peer: &PeerId) -> Result<PeerInfo, P2pError> {
        if *peer == self.shared.id {
            return Err(P2pError::PeerUnreachable(format!("{} is this node", peer)));
        }
        if !self.is_online() {
            return Err(P2pError::Offline);
        }
        let remote = self
            .network
            .dial(peer)
            .ok_or_else(|| P2pError::PeerUnreachable(peer.to_string()))?;

        let remote_info = remote.peer_info();
        self.shared.attach(remote_info.clone());
        if !remote.attach(self.shared.peer_info()) && !remote.is_connected(&self.shared.id) {
            // Remote went offline while we dialed
            self.shared.detach(peer);
            return Err(P2pError::PeerUnreachable(peer.to_string()));
        }

        self.handshake(&remote)?;
        Ok(remote_info)
    }

    fn handshake(&self, remote: &NodeShared) -> Result<(), P2pError> {
        let local = &self.shared.profile;
        if remote.profile.protocol_id != local.protocol_id {
            warn!(
                peer = %self.shared.id,
                remote = %remote.id,
                local_protocol = %local.protocol_id,
                remote_protocol = %remote.profile.protocol_id,
                "Handshake failed"
            );
            return Err(P2pError::HandshakeFailed {
                peer: remote.id.to_string(),
                reason: format!("remote speaks {}", remote.profile.protocol_id),
            });
        }
        self.shared.admit(remote.profile.clone());
        remote.admit(local.clone());
        Ok(())
    }

    /// Close the connection to `peer` on both sides
    pub async fn disconnect(&self, peer: &PeerId) -> Result<(), P2pError> {
        if !self.shared.detach(peer) {
            return Err(P2pError::NotConnected(peer.to_string()));
        }
        if let Some(remote) = self.network.dial(peer) {
            remote.detach(&self.shared.id);
        }
        Ok(())
    }

    /// Send an application message, fired as MessageReceived at `peer`
    pub async fn send_message(
        &self,
        peer: &PeerId,
        kind: &str,
        body: serde_json::Value,
    ) -> Result<(), P2pError> {
        let remote = self.remote(peer)?;
        remote.deliver(Message {
            from: self.shared.id.clone(),
            kind: kind.to_string(),
            body,
        })
    }

    /// Connected remote node, for peer-addressed requests
    fn remote(&self, peer: &PeerId) -> Result<Arc<NodeShared>, P2pError> {
        if !self.is_online() {
            return Err(P2pError::Offline);
        }
        if !self.shared.is_connected(peer) {
            return Err(P2pError::NotConnected(peer.to_string()));
        }
        self.network
            .dial(peer)
            .ok_or_else(|| P2pError::PeerUnreachable(peer.to_string()))
    }
}

impl Transport for Node {
    async fn fetch_log(
        &self,
        peer: &PeerId,
        reference: &LogRef,
        since: Option<EntryId>,
    ) -> Result<LogSlice, P2pError> {
        self.remote(peer)?.serve_log(reference, since.as_ref())
    }

    async fn fetch_snapshot(&self, peer: &PeerId, path: &str) -> Result<Snapshot, P2pError> {
        self.remote(peer)?.serve_snapshot(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(network: &Network, ctx: &Context, name: &str) -> Node {
        Node::in_memory(network, ctx, name).unwrap()
    }

    #[tokio::test]
    async fn test_starts_offline() {
        let ctx = Context::new();
        let network = Network::new();
        let a = node(&network, &ctx, "a");
        assert!(!a.is_online());
        assert_eq!(a.lifecycle(), Lifecycle::Offline);
        assert!(network.listening().is_empty());

        let addrs = a.go_online(&ctx).await.unwrap();
        assert!(a.is_online());
        assert_eq!(addrs, vec![format!("/memory/{}", a.id())]);
        assert_eq!(network.listening(), vec![a.id().clone()]);

        // Second call settles on the same state
        assert_eq!(a.go_online(&ctx).await.unwrap(), addrs);

        a.go_offline().await.unwrap();
        a.go_offline().await.unwrap();
        assert!(!a.is_online());
        assert!(a.listen_addrs().is_empty());
    }

    #[tokio::test]
    async fn test_connect_requires_online() {
        let ctx = Context::new();
        let network = Network::new();
        let a = node(&network, &ctx, "a");
        let b = node(&network, &ctx, "b");
        b.go_online(&ctx).await.unwrap();

        assert!(matches!(a.connect(b.id()).await, Err(P2pError::Offline)));
        a.go_online(&ctx).await.unwrap();
        assert!(matches!(
            a.connect(&PeerId::from("nobody")).await,
            Err(P2pError::PeerUnreachable(_))
        ));
        assert!(matches!(
            a.connect(a.id()).await,
            Err(P2pError::PeerUnreachable(_))
        ));

        a.connect(b.id()).await.unwrap();
        assert_eq!(a.connected_peers()[0].id, *b.id());
        assert_eq!(b.participants()[0].peername, "a");
    }

    #[tokio::test]
    async fn test_protocol_mismatch_stays_transport_only() {
        let ctx = Context::new();
        let network = Network::new();
        let a = node(&network, &ctx, "a");
        let mut config = NodeConfig::generate("other");
        config.p2p.protocol_id = "/other/1.0.0".to_string();
        let b = Node::with_config(&network, &ctx, &config).unwrap();
        a.go_online(&ctx).await.unwrap();
        b.go_online(&ctx).await.unwrap();

        let err = a.connect(b.id()).await.unwrap_err();
        assert!(matches!(err, P2pError::HandshakeFailed { .. }));
        assert_eq!(a.connected_peers().len(), 1);
        assert!(a.participants().is_empty());
        assert!(b.participants().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_node_stays_offline() {
        let ctx = Context::new();
        let network = Network::new();
        let mut config = NodeConfig::generate("quiet");
        config.p2p.enabled = false;
        let quiet = Node::with_config(&network, &ctx, &config).unwrap();
        assert!(matches!(quiet.go_online(&ctx).await, Err(P2pError::Disabled)));
        assert!(!quiet.is_online());
    }

    #[tokio::test]
    async fn test_book_owner_must_match_actor() {
        let ctx = Context::new();
        let network = Network::new();
        let config = NodeConfig::generate("a");
        let stranger = Book::new([9u8; 16]);
        let result = Node::new(
            &network,
            &ctx,
            &config,
            Arc::new(RwLock::new(stranger)),
            Arc::new(MemoryStore::new()),
        );
        assert!(matches!(
            result,
            Err(P2pError::Core(VellumError::NotAuthor { .. }))
        ));
    }

    #[tokio::test]
    async fn test_message_requires_connection() {
        let ctx = Context::new();
        let network = Network::new();
        let a = node(&network, &ctx, "a");
        let b = node(&network, &ctx, "b");
        a.go_online(&ctx).await.unwrap();
        b.go_online(&ctx).await.unwrap();

        let err = a
            .send_message(b.id(), "ping", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, P2pError::NotConnected(_)));

        let mut inbox = b.bus().subscribe(&[Topic::MessageReceived]);
        a.connect(b.id()).await.unwrap();
        a.send_message(b.id(), "ping", serde_json::json!({"n": 1}))
            .await
            .unwrap();
        let event = inbox.recv().await.unwrap();
        match event.payload {
            Payload::Message(msg) => {
                assert_eq!(msg.from, *a.id());
                assert_eq!(msg.kind, "ping");
                assert_eq!(msg.body["n"], 1);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }
}
