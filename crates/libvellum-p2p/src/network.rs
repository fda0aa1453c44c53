use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::node::NodeShared;
use crate::peer::PeerId;

/// In-process switchboard connecting nodes by peer ID.
///
/// Nodes register while online and are held weakly, so a dropped node
/// simply becomes unreachable.
#[derive(Clone, Default)]
pub struct Network {
    listeners: Arc<Mutex<HashMap<PeerId, Weak<NodeShared>>>>,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn listen(&self, node: &Arc<NodeShared>) {
        self.lock().insert(node.id.clone(), Arc::downgrade(node));
    }

    pub(crate) fn unlisten(&self, id: &PeerId) {
        self.lock().remove(id);
    }

    pub(crate) fn dial(&self, id: &PeerId) -> Option<Arc<NodeShared>> {
        let mut listeners = self.lock();
        match listeners.get(id).map(Weak::upgrade) {
            Some(Some(node)) => Some(node),
            Some(None) => {
                listeners.remove(id);
                None
            }
            None => None,
        }
    }

    /// Peers currently accepting connections
    pub fn listening(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self
            .lock()
            .iter()
            .filter(|(_, node)| node.strong_count() > 0)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PeerId, Weak<NodeShared>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
