use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

use crate::conduits::{
    Actor, ConduitConnection, ConduitTypeId, ConduitTypeRegistry, ConnectionState,
    DynamicConnectionState, GraphArena, NodeIdentifier, SlotType, Stack,
};
use crate::error::{ConduitError, Result};
use crate::types::{Direction, Position};

/// A bundle holds at most this many conduit types.
pub const MAX_CONDUIT_TYPES: usize = 9;

/// Result of [`ConduitBundle::add_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Full, duplicate or incompatible; nothing changed.
    Blocked,
    Insert,
    /// The incoming type replaced a lower tier in place.
    Upgrade { replaced: ConduitTypeId },
}

impl AddOutcome {
    pub fn has_changed(self) -> bool {
        !matches!(self, AddOutcome::Blocked)
    }
}

/// Opaque block-appearance override for one face.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Facade(pub String);

/// Serialized payload of one node, keyed by its type's persisted key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(rename = "type")]
    pub conduit_type: String,
    pub data: Value,
}

/// Persisted form of a [`ConduitBundle`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleRecord {
    pub types: Vec<String>,
    #[serde(default)]
    pub connections: BTreeMap<Direction, Vec<ConnectionState>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub facades: BTreeMap<Direction, Facade>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<NodeRecord>,
}

impl BundleRecord {
    /// The persisted state of the link across `direction` for the type stored under `key`.
    pub fn connection_state(&self, direction: Direction, key: &str) -> Option<&ConnectionState> {
        let index = self.types.iter().position(|stored| stored == key)?;
        self.connections.get(&direction)?.get(index)
    }
}

/**
 * Everything that lives at one conduit position: the ordered conduit types, one node per
 * materialized type, six per-face connection sequences and the facades.
 *
 * Types are kept sorted by [`ConduitTypeRegistry::sort_index`]. Each of the six
 * [`ConduitConnection`]s holds exactly one state per type, at the type's index.
 */
#[derive(Debug)]
pub struct ConduitBundle {
    position: Position,
    types: Vec<ConduitTypeId>,
    nodes: HashMap<ConduitTypeId, NodeIdentifier>,
    connections: [ConduitConnection; 6],
    facades: BTreeMap<Direction, Facade>,
    dirty: bool,
}

impl ConduitBundle {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            types: Vec::new(),
            nodes: HashMap::new(),
            connections: Default::default(),
            facades: BTreeMap::new(),
            dirty: false,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn types(&self) -> &[ConduitTypeId] {
        &self.types
    }

    pub fn contains(&self, conduit_type: ConduitTypeId) -> bool {
        self.types.contains(&conduit_type)
    }

    pub fn type_index(&self, conduit_type: ConduitTypeId) -> Option<usize> {
        self.types.iter().position(|ty| *ty == conduit_type)
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Adds a conduit type, upgrading a lower tier in place when one is present.
    ///
    /// Only this bundle changes. Linking to neighbours and integrating the new node into a
    /// network is up to the caller.
    pub fn add_type(
        &mut self,
        registry: &ConduitTypeRegistry,
        graphs: &mut GraphArena,
        conduit_type: ConduitTypeId,
        actor: Option<&Actor>,
    ) -> AddOutcome {
        let incoming = &registry[conduit_type];
        if self.types.len() >= MAX_CONDUIT_TYPES || self.contains(conduit_type) {
            debug!(position = %self.position, conduit_type = incoming.key(), "add blocked");
            return AddOutcome::Blocked;
        }

        if let Some(index) = self
            .types
            .iter()
            .position(|ty| registry[*ty].can_be_replaced_by(incoming))
        {
            let replaced = self.types[index];
            if let Some(mut node) = self.nodes.remove(&replaced) {
                node.data_mut().on_removed(&registry[replaced], self.position);
                graphs.remove(&mut node);
            }

            self.types[index] = conduit_type;
            for connection in &mut self.connections {
                connection.clear_type(index);
            }
            self.materialize(registry, conduit_type, actor);
            self.mark_dirty();
            debug!(
                position = %self.position,
                from = registry[replaced].key(),
                to = incoming.key(),
                "conduit upgraded"
            );
            return AddOutcome::Upgrade { replaced };
        }

        if self.types.iter().any(|ty| {
            !registry[*ty].can_be_in_same_block(incoming) || !incoming.can_be_in_same_block(&registry[*ty])
        }) {
            debug!(position = %self.position, conduit_type = incoming.key(), "add blocked by co-location rule");
            return AddOutcome::Blocked;
        }

        let sort_key = registry.sort_index(conduit_type);
        let index = self
            .types
            .partition_point(|ty| registry.sort_index(*ty) < sort_key);
        self.types.insert(index, conduit_type);
        for connection in &mut self.connections {
            connection.add_type(index);
        }
        self.materialize(registry, conduit_type, actor);
        self.mark_dirty();
        debug!(position = %self.position, conduit_type = incoming.key(), index, "conduit added");
        AddOutcome::Insert
    }

    fn materialize(
        &mut self,
        registry: &ConduitTypeRegistry,
        conduit_type: ConduitTypeId,
        actor: Option<&Actor>,
    ) {
        let descriptor = &registry[conduit_type];
        let mut node = NodeIdentifier::new(self.position, descriptor.create_data(self.position));
        node.data_mut().on_created(descriptor, self.position, actor);
        self.nodes.insert(conduit_type, node);
    }

    /// Removes a conduit type and its node. Returns whether the bundle is now empty.
    ///
    /// Removing an absent type fails in strict mode and is a no-op otherwise. Neighbour links
    /// and the connectivity of the node's former network are left to the caller.
    pub fn remove_type(
        &mut self,
        registry: &ConduitTypeRegistry,
        graphs: &mut GraphArena,
        conduit_type: ConduitTypeId,
        strict: bool,
    ) -> Result<bool> {
        let Some(index) = self.type_index(conduit_type) else {
            if strict {
                return Err(ConduitError::TypeNotPresent {
                    conduit_type: registry[conduit_type].key().to_string(),
                    present: self
                        .types
                        .iter()
                        .map(|ty| registry[*ty].key().to_string())
                        .collect(),
                });
            }
            return Ok(self.types.is_empty());
        };

        if let Some(mut node) = self.nodes.remove(&conduit_type) {
            node.data_mut().on_removed(&registry[conduit_type], self.position);
            graphs.remove(&mut node);
        }
        self.types.remove(index);
        for connection in &mut self.connections {
            connection.remove_type(index);
        }
        self.mark_dirty();
        debug!(position = %self.position, conduit_type = registry[conduit_type].key(), "conduit removed");
        Ok(self.types.is_empty())
    }

    /// Rebinds every materialized node to its live position.
    pub fn on_load(&mut self, registry: &ConduitTypeRegistry) {
        for conduit_type in &self.types {
            if let Some(node) = self.nodes.get_mut(conduit_type) {
                node.data_mut()
                    .on_created(&registry[*conduit_type], self.position, None);
            }
        }
    }

    pub fn connection(&self, direction: Direction) -> &ConduitConnection {
        &self.connections[direction.index()]
    }

    pub fn connection_state(
        &self,
        direction: Direction,
        conduit_type: ConduitTypeId,
    ) -> Option<&ConnectionState> {
        let index = self.type_index(conduit_type)?;
        self.connections[direction.index()].state(index)
    }

    pub fn is_connected_to(&self, direction: Direction, conduit_type: ConduitTypeId) -> bool {
        self.connection_state(direction, conduit_type)
            .is_some_and(ConnectionState::is_connected)
    }

    /// Faces over which `conduit_type` is linked.
    pub fn connected_directions(&self, conduit_type: ConduitTypeId) -> Vec<Direction> {
        Direction::ALL
            .into_iter()
            .filter(|direction| self.is_connected_to(*direction, conduit_type))
            .collect()
    }

    /// Links `conduit_type` across `direction`: [`ConnectionState::Enabled`] towards a plain
    /// block (`end`), [`ConnectionState::Dynamic`] towards another conduit.
    pub fn connect_to(&mut self, direction: Direction, conduit_type: ConduitTypeId, end: bool) -> bool {
        let Some(index) = self.type_index(conduit_type) else {
            return false;
        };
        let before = self.connections[direction.index()].state(index).cloned();
        let linked = self.connections[direction.index()].connect_to(index, end);
        if linked && self.connections[direction.index()].state(index) != before.as_ref() {
            self.mark_dirty();
        }
        linked
    }

    /// Disables the link, returning the previous state.
    pub fn disconnect_from(
        &mut self,
        direction: Direction,
        conduit_type: ConduitTypeId,
    ) -> Option<ConnectionState> {
        let index = self.type_index(conduit_type)?;
        let previous = self.connections[direction.index()].disconnect_from(index)?;
        if previous.is_connected() {
            self.mark_dirty();
        }
        Some(previous)
    }

    /// Configuration of a dynamic link; `None` for disabled and enabled links.
    pub fn dynamic_state_mut(
        &mut self,
        direction: Direction,
        conduit_type: ConduitTypeId,
    ) -> Option<&mut DynamicConnectionState> {
        let index = self.type_index(conduit_type)?;
        self.connections[direction.index()]
            .state_mut(index)
            .and_then(ConnectionState::as_dynamic_mut)
    }

    pub(crate) fn item(&self, slot: SlotType, direction: Direction, index: usize) -> Option<&Stack> {
        self.connections[direction.index()].item(slot, index)
    }

    pub(crate) fn set_item(
        &mut self,
        slot: SlotType,
        direction: Direction,
        index: usize,
        stack: Option<Stack>,
    ) -> bool {
        let stored = self.connections[direction.index()].set_item(slot, index, stack);
        if stored {
            self.mark_dirty();
        }
        stored
    }

    /// Filter and upgrade items held in the dynamic links of `conduit_type`.
    pub fn dropped_items(&self, conduit_type: ConduitTypeId) -> Vec<Stack> {
        let Some(index) = self.type_index(conduit_type) else {
            return Vec::new();
        };
        self.connections
            .iter()
            .filter_map(|connection| connection.state(index).and_then(ConnectionState::as_dynamic))
            .flat_map(|state| state.items().cloned())
            .collect()
    }

    pub fn node_for(&self, conduit_type: ConduitTypeId) -> Option<&NodeIdentifier> {
        self.nodes.get(&conduit_type)
    }

    pub fn node_for_mut(&mut self, conduit_type: ConduitTypeId) -> Option<&mut NodeIdentifier> {
        self.nodes.get_mut(&conduit_type)
    }

    /// Installs `node` for a type the bundle holds, returning the node it displaces. A node for
    /// an absent type is handed back untouched.
    pub fn set_node_for(
        &mut self,
        conduit_type: ConduitTypeId,
        node: NodeIdentifier,
    ) -> Option<NodeIdentifier> {
        if !self.contains(conduit_type) {
            warn!(position = %self.position, %conduit_type, "node for a type the bundle does not hold");
            return Some(node);
        }
        debug_assert_eq!(node.position(), self.position);
        self.nodes.insert(conduit_type, node)
    }

    pub fn take_node_for(&mut self, conduit_type: ConduitTypeId) -> Option<NodeIdentifier> {
        self.nodes.remove(&conduit_type)
    }

    pub fn has_facade(&self, direction: Direction) -> bool {
        self.facades.contains_key(&direction)
    }

    pub fn facade(&self, direction: Direction) -> Option<&Facade> {
        self.facades.get(&direction)
    }

    pub fn set_facade(&mut self, direction: Direction, facade: Facade) {
        self.facades.insert(direction, facade);
        self.mark_dirty();
    }

    pub fn clear_facade(&mut self, direction: Direction) -> Option<Facade> {
        let previous = self.facades.remove(&direction);
        if previous.is_some() {
            self.mark_dirty();
        }
        previous
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns and clears the dirty flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// A detached copy for read-only observers. Copied nodes belong to no graph.
    pub fn deep_copy(&self) -> ConduitBundle {
        ConduitBundle {
            position: self.position,
            types: self.types.clone(),
            nodes: self
                .nodes
                .iter()
                .map(|(ty, node)| (*ty, node.deep_copy()))
                .collect(),
            connections: self.connections.clone(),
            facades: self.facades.clone(),
            dirty: false,
        }
    }

    pub fn to_record(&self, registry: &ConduitTypeRegistry) -> BundleRecord {
        let types = self
            .types
            .iter()
            .map(|ty| registry[*ty].key().to_string())
            .collect();
        let connections = Direction::ALL
            .into_iter()
            .map(|direction| (direction, self.connection(direction).states().to_vec()))
            .collect();
        let nodes = self
            .types
            .iter()
            .filter_map(|ty| {
                let node = self.nodes.get(ty)?;
                node.data().sync_to_client().then(|| NodeRecord {
                    conduit_type: registry[*ty].key().to_string(),
                    data: node.data().to_value(),
                })
            })
            .collect();

        BundleRecord {
            types,
            connections,
            facades: self.facades.clone(),
            nodes,
        }
    }

    /// Restores a bundle. Unknown, duplicate and excess types are dropped together with their
    /// connection states; every remaining type gets a fresh node carrying any stored payload.
    pub fn from_record(
        registry: &ConduitTypeRegistry,
        position: Position,
        record: BundleRecord,
    ) -> Result<Self> {
        let BundleRecord {
            types: keys,
            mut connections,
            facades,
            nodes,
        } = record;

        let mut states: [Vec<ConnectionState>; 6] = Default::default();
        for direction in Direction::ALL {
            let mut sequence = connections.remove(&direction).unwrap_or_default();
            if sequence.len() != keys.len() {
                warn!(
                    %position,
                    %direction,
                    found = sequence.len(),
                    expected = keys.len(),
                    "connection sequence misaligned with types"
                );
                sequence.resize(keys.len(), ConnectionState::Disabled);
            }
            states[direction.index()] = sequence;
        }

        let mut seen = HashSet::new();
        let resolved: Vec<Option<ConduitTypeId>> = keys
            .iter()
            .map(|key| match registry.by_key(key) {
                None => {
                    warn!(%position, %key, "dropping unknown conduit type");
                    None
                }
                Some(id) if !seen.insert(id) => {
                    warn!(%position, %key, "dropping duplicate conduit type");
                    None
                }
                Some(_) if seen.len() > MAX_CONDUIT_TYPES => {
                    warn!(%position, %key, "dropping conduit type beyond capacity");
                    None
                }
                Some(id) => Some(id),
            })
            .collect();

        let mut types: Vec<ConduitTypeId> = resolved.iter().flatten().copied().collect();
        // Drop back to front so pending indices stay valid.
        for index in (0..resolved.len()).rev() {
            if resolved[index].is_none() {
                for sequence in &mut states {
                    sequence.remove(index);
                }
            }
        }

        let mut order: Vec<usize> = (0..types.len()).collect();
        order.sort_by_key(|i| registry.sort_index(types[*i]));
        if order.iter().enumerate().any(|(at, i)| at != *i) {
            debug!(%position, "reordering persisted conduit types");
            types = order.iter().map(|i| types[*i]).collect();
            for sequence in &mut states {
                let mut taken: Vec<Option<ConnectionState>> =
                    std::mem::take(sequence).into_iter().map(Some).collect();
                *sequence = order
                    .iter()
                    .map(|i| taken[*i].take().unwrap_or_default())
                    .collect();
            }
        }

        let mut bundle = ConduitBundle {
            position,
            types,
            nodes: HashMap::new(),
            connections: states.map(ConduitConnection::from_states),
            facades,
            dirty: false,
        };

        for conduit_type in bundle.types.clone() {
            let data = registry[conduit_type].create_data(position);
            bundle
                .nodes
                .insert(conduit_type, NodeIdentifier::new(position, data));
        }
        for record in nodes {
            let node = registry
                .by_key(&record.conduit_type)
                .and_then(|id| bundle.nodes.get_mut(&id));
            match node {
                Some(node) => node.data_mut().load_value(&record.data)?,
                None => debug!(%position, key = %record.conduit_type, "dropping orphaned node data"),
            }
        }

        Ok(bundle)
    }

    pub fn to_bytes(&self, registry: &ConduitTypeRegistry) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.to_record(registry))?)
    }

    pub fn from_bytes(
        registry: &ConduitTypeRegistry,
        position: Position,
        bytes: &[u8],
    ) -> Result<Self> {
        let record: BundleRecord = serde_json::from_slice(bytes)?;
        Self::from_record(registry, position, record)
    }
}
