use std::collections::BTreeSet;
use tracing::{debug, trace, warn};

use crate::conduits::distribution::RoundRobin;
use crate::conduits::{ConduitTypeId, NodeIdentifier, NodeKey};
use crate::types::Position;

/// Generational handle of a graph inside a [`GraphArena`]. A handle whose graph has been
/// discarded never resolves again, even after its slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GraphId {
    index: u32,
    generation: u32,
}

/// One connected network of a single conduit type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    conduit_type: ConduitTypeId,
    members: BTreeSet<Position>,
    cursor: RoundRobin,
}

impl Graph {
    fn single(key: NodeKey) -> Self {
        Self {
            conduit_type: key.conduit_type,
            members: BTreeSet::from([key.position]),
            cursor: RoundRobin::default(),
        }
    }

    pub fn conduit_type(&self) -> ConduitTypeId {
        self.conduit_type
    }

    pub fn positions(&self) -> &BTreeSet<Position> {
        &self.members
    }

    pub fn members(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.members
            .iter()
            .map(|position| NodeKey::new(self.conduit_type, *position))
    }

    pub fn contains(&self, position: Position) -> bool {
        self.members.contains(&position)
    }

    /// Where this network's transfer policy resumes its round robin. A merge keeps the
    /// survivor's cursor.
    pub fn cursor(&self) -> RoundRobin {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Lookup of live node identifiers, wherever they are currently held.
pub trait NodeStore {
    fn node(&self, key: NodeKey) -> Option<&NodeIdentifier>;

    fn node_mut(&mut self, key: NodeKey) -> Option<&mut NodeIdentifier>;
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    graph: Option<Graph>,
}

/**
 * Owns every conduit network of a world. Graphs hold the positions of their members; members
 * point back through [`NodeIdentifier::graph`]. Merging is union by size with a handle rewrite per
 * absorbed member. Removal only detaches: a graph that may have split is re-derived by the caller
 * with [`GraphArena::dissolve`] followed by fresh [`GraphArena::integrate`] calls.
 */
#[derive(Debug, Default)]
pub struct GraphArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl GraphArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: GraphId) -> Option<&Graph> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.graph.as_ref())
    }

    fn get_mut(&mut self, id: GraphId) -> Option<&mut Graph> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.graph.as_mut())
    }

    pub fn contains(&self, id: GraphId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn cursor_mut(&mut self, id: GraphId) -> Option<&mut RoundRobin> {
        self.get_mut(id).map(|graph| &mut graph.cursor)
    }

    /// Number of live graphs.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (GraphId, &Graph)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.graph.as_ref().map(|graph| {
                (
                    GraphId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    graph,
                )
            })
        })
    }

    /// Members of the given graph, or nothing for a dead handle.
    pub fn members(&self, id: GraphId) -> Vec<NodeKey> {
        self.get(id)
            .map(|graph| graph.members().collect())
            .unwrap_or_default()
    }

    /// The live graph the node at `key` belongs to.
    pub fn owning_graph<S: NodeStore + ?Sized>(&self, store: &S, key: NodeKey) -> Option<GraphId> {
        store
            .node(key)
            .and_then(|node| node.graph)
            .filter(|id| self.contains(*id))
    }

    fn allocate(&mut self, graph: Graph) -> GraphId {
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                debug_assert!(slot.graph.is_none());
                slot.graph = Some(graph);
                GraphId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    graph: Some(graph),
                });
                GraphId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        }
    }

    fn discard(&mut self, id: GraphId) -> Option<Graph> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let graph = slot.graph.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        trace!(?id, members = graph.len(), "discarded graph");
        Some(graph)
    }

    /// Folds `node` and every neighbour's network into one graph and returns it.
    ///
    /// The node's own graph is extended when it has one; otherwise a one-member graph is
    /// created, even when `neighbors` is empty. Final membership does not depend on the order of
    /// `neighbors`. Returns `None` only when `node` is not in `store`.
    pub fn integrate<S: NodeStore + ?Sized>(
        &mut self,
        store: &mut S,
        node: NodeKey,
        neighbors: &[NodeKey],
    ) -> Option<GraphId> {
        let existing = self.owning_graph(store, node);
        let own = store.node_mut(node)?;
        let mut working = match existing {
            Some(id) => id,
            None => {
                let id = self.allocate(Graph::single(node));
                own.graph = Some(id);
                id
            }
        };

        for &neighbor in neighbors {
            if neighbor.conduit_type != node.conduit_type {
                warn!(?node, ?neighbor, "refusing to merge networks of different conduit types");
                continue;
            }
            if store.node(neighbor).is_none() {
                trace!(?neighbor, "neighbour node not materialized, skipping");
                continue;
            }

            match self.owning_graph(store, neighbor) {
                Some(id) if id == working => {}
                Some(other) => working = self.merge(store, working, other),
                None => {
                    if let Some(graph) = self.get_mut(working) {
                        graph.members.insert(neighbor.position);
                    }
                    if let Some(neighbor_node) = store.node_mut(neighbor) {
                        neighbor_node.graph = Some(working);
                    }
                }
            }
        }

        Some(working)
    }

    /// Absorbs the smaller of two graphs into the larger and returns the survivor.
    fn merge<S: NodeStore + ?Sized>(&mut self, store: &mut S, a: GraphId, b: GraphId) -> GraphId {
        let size_a = self.get(a).map_or(0, Graph::len);
        let size_b = self.get(b).map_or(0, Graph::len);
        let (survivor, absorbed) = if size_a >= size_b { (a, b) } else { (b, a) };

        let Some(absorbed_graph) = self.discard(absorbed) else {
            return survivor;
        };
        let conduit_type = absorbed_graph.conduit_type;
        debug!(
            ?survivor,
            ?absorbed,
            moved = absorbed_graph.len(),
            "merging conduit networks"
        );

        for position in absorbed_graph.members {
            if let Some(graph) = self.get_mut(survivor) {
                graph.members.insert(position);
            }
            if let Some(member) = store.node_mut(NodeKey::new(conduit_type, position)) {
                member.graph = Some(survivor);
            }
        }

        survivor
    }

    /// Detaches `node` from its graph; a graph left without members is discarded.
    ///
    /// The remaining members are not re-checked for connectivity.
    pub fn remove(&mut self, node: &mut NodeIdentifier) {
        let Some(id) = node.graph.take() else {
            return;
        };
        let Some(graph) = self.get_mut(id) else {
            return;
        };

        graph.members.remove(&node.position());
        if graph.members.is_empty() {
            self.discard(id);
        }
    }

    /// Discards a graph and clears the handle of each of its members, returning them so the
    /// caller can re-integrate what is still connected.
    pub fn dissolve<S: NodeStore + ?Sized>(&mut self, store: &mut S, id: GraphId) -> Vec<NodeKey> {
        let Some(graph) = self.discard(id) else {
            return Vec::new();
        };

        let members: Vec<NodeKey> = graph.members().collect();
        for key in &members {
            if let Some(node) = store.node_mut(*key) {
                debug_assert_eq!(node.graph, Some(id));
                node.graph = None;
            }
        }
        members
    }
}
