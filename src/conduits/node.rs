use crate::conduits::{ConduitTypeId, ExtendedConduitData, GraphId};
use crate::types::Position;

/// Addresses the node of one conduit type at one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey {
    pub conduit_type: ConduitTypeId,
    pub position: Position,
}

impl NodeKey {
    pub fn new(conduit_type: ConduitTypeId, position: Position) -> Self {
        Self {
            conduit_type,
            position,
        }
    }
}

/// Membership unit of a conduit network: one per (position, conduit type) that is instantiated.
///
/// The graph handle is a weak back-reference into a [`GraphArena`](crate::conduits::GraphArena);
/// it is only ever rewritten by the arena.
#[derive(Debug)]
pub struct NodeIdentifier {
    position: Position,
    data: Box<dyn ExtendedConduitData>,
    pub(crate) graph: Option<GraphId>,
}

impl NodeIdentifier {
    pub fn new(position: Position, data: Box<dyn ExtendedConduitData>) -> Self {
        Self {
            position,
            data,
            graph: None,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn data(&self) -> &dyn ExtendedConduitData {
        self.data.as_ref()
    }

    pub fn data_mut(&mut self) -> &mut dyn ExtendedConduitData {
        self.data.as_mut()
    }

    /// The network this node belongs to, if any.
    pub fn graph(&self) -> Option<GraphId> {
        self.graph
    }

    /// Copies the node for the presentation bundle. The copy belongs to no graph.
    pub fn deep_copy(&self) -> NodeIdentifier {
        NodeIdentifier {
            position: self.position,
            data: self.data.deep_copy(),
            graph: None,
        }
    }
}
