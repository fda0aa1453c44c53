//! Event bus
//!
//! Topics are a fixed set owned by this module. Each subscriber gets its own
//! bounded queue; publishing never waits on a subscriber, a full queue loses
//! the event for that subscriber only. The bus is bound to one [`Context`]:
//! once it is cancelled every subscription closes and publishing stops.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::context::Context;
use crate::peer::{Message, PeerInfo, Profile};

/// Named class of lifecycle or network event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    GoneOnline,
    GoneOffline,
    QriPeerConnected,
    QriPeerDisconnected,
    PeerConnected,
    PeerDisconnected,
    MessageReceived,
}

impl Topic {
    pub const ALL: [Topic; 7] = [
        Topic::GoneOnline,
        Topic::GoneOffline,
        Topic::QriPeerConnected,
        Topic::QriPeerDisconnected,
        Topic::PeerConnected,
        Topic::PeerDisconnected,
        Topic::MessageReceived,
    ];

    /// Stable topic string
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::GoneOnline => "p2p:GoneOnline",
            Topic::GoneOffline => "p2p:GoneOffline",
            Topic::QriPeerConnected => "p2p:QriPeerConnected",
            Topic::QriPeerDisconnected => "p2p:QriPeerDisconnected",
            Topic::PeerConnected => "p2p:PeerConnected",
            Topic::PeerDisconnected => "p2p:PeerDisconnected",
            Topic::MessageReceived => "p2p:MessageReceived",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown topic: {}", s))
    }
}

/// Data attached to an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// GoneOffline
    None,
    /// GoneOnline
    ListenAddrs(Vec<String>),
    /// PeerConnected, PeerDisconnected
    Peer(PeerInfo),
    /// QriPeerConnected, QriPeerDisconnected
    Participant(Profile),
    /// MessageReceived
    Message(Message),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub topic: Topic,
    pub payload: Payload,
}

impl Event {
    pub fn new(topic: Topic, payload: Payload) -> Self {
        Self { topic, payload }
    }
}

struct Subscriber {
    id: u64,
    topics: Vec<Topic>,
    tx: mpsc::Sender<Event>,
}

struct BusState {
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

struct BusInner {
    ctx: Context,
    capacity: usize,
    state: Mutex<BusState>,
}

/// Process-wide publish/subscribe hub
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

impl Bus {
    /// Bus bound to `ctx`, queueing up to `capacity` events per subscriber
    pub fn new(ctx: &Context, capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                ctx: ctx.clone(),
                capacity: capacity.max(1),
                state: Mutex::new(BusState {
                    subscribers: Vec::new(),
                    next_id: 0,
                }),
            }),
        }
    }

    pub fn context(&self) -> &Context {
        &self.inner.ctx
    }

    /// Receive every future event on any of `topics`
    pub fn subscribe(&self, topics: &[Topic]) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let mut state = self.lock();
        if !self.inner.ctx.is_cancelled() {
            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.push(Subscriber {
                id,
                topics: topics.to_vec(),
                tx,
            });
            debug!(subscriber = id, topics = ?topics, "Subscribed");
        }
        Subscription {
            rx,
            ctx: self.inner.ctx.clone(),
        }
    }

    /// Deliver `event` to every subscriber of its topic, returning how many
    /// received it. Never blocks.
    pub fn publish(&self, event: Event) -> usize {
        let mut state = self.lock();
        if self.inner.ctx.is_cancelled() {
            // Dropping the senders closes every subscription
            state.subscribers.clear();
            return 0;
        }

        let topic = event.topic;
        let mut delivered = 0;
        state.subscribers.retain(|sub| {
            if !sub.topics.contains(&topic) {
                return true;
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!(subscriber = sub.id, topic = %topic, "Subscriber lagging, event dropped");
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            }
        });
        debug!(topic = %topic, delivered, "Published event");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusState> {
        // The state is a plain list, consistent even after a panic elsewhere
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Receiving end of a bus subscription
pub struct Subscription {
    rx: mpsc::Receiver<Event>,
    ctx: Context,
}

impl Subscription {
    /// Next event, or `None` once the bus context is cancelled
    pub async fn recv(&mut self) -> Option<Event> {
        tokio::select! {
            biased;
            _ = self.ctx.cancelled() => {}
            event = self.rx.recv() => return event,
        }
        self.rx.close();
        None
    }

    /// Next already-queued event, without waiting
    pub fn try_recv(&mut self) -> Option<Event> {
        if self.ctx.is_cancelled() {
            self.rx.close();
            return None;
        }
        self.rx.try_recv().ok()
    }
}
