use std::collections::HashMap;
use tracing::trace;

use crate::conduits::{ConduitTypeId, GraphArena, GraphId, NodeIdentifier, NodeKey};

/// World-scoped holding area for nodes of unloaded positions, plus the registry of networks
/// the ticker walks. Created with its world and dropped with it.
#[derive(Debug, Default)]
pub struct DormantStore {
    unloaded: HashMap<NodeKey, NodeIdentifier>,
    networks: HashMap<ConduitTypeId, Vec<GraphId>>,
}

impl DormantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks a node; its graph membership is kept.
    pub fn put(&mut self, key: NodeKey, node: NodeIdentifier) {
        trace!(?key, graph = ?node.graph(), "node parked");
        self.unloaded.insert(key, node);
    }

    pub fn take(&mut self, key: NodeKey) -> Option<NodeIdentifier> {
        self.unloaded.remove(&key)
    }

    pub fn get(&self, key: NodeKey) -> Option<&NodeIdentifier> {
        self.unloaded.get(&key)
    }

    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut NodeIdentifier> {
        self.unloaded.get_mut(&key)
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.unloaded.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.unloaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unloaded.is_empty()
    }

    /// Makes a network known to the ticker.
    pub fn register_pending_graph(&mut self, conduit_type: ConduitTypeId, graph: GraphId) {
        let pending = self.networks.entry(conduit_type).or_default();
        if !pending.contains(&graph) {
            pending.push(graph);
        }
    }

    /// Live networks of a type, in registration order. Dead handles are pruned on the way.
    pub fn live_networks(&mut self, conduit_type: ConduitTypeId, graphs: &GraphArena) -> Vec<GraphId> {
        let Some(pending) = self.networks.get_mut(&conduit_type) else {
            return Vec::new();
        };
        pending.retain(|id| graphs.contains(*id));
        pending.clone()
    }

    pub fn clear(&mut self) {
        self.unloaded.clear();
        self.networks.clear();
    }
}
