use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::conduits::{
    Actor, AddOutcome, BundleRecord, CapabilityResolver, ConduitBundle, ConduitEndpoint,
    ConduitItemSlots, ConduitTypeId, ConduitTypeRegistry, ConnectionState, DormantStore,
    DynamicConnectionState, Facade, GraphArena, GraphId, NetworkView, NodeIdentifier, NodeKey,
    NodeStore, Stack,
};
use crate::config::ConduitConfig;
use crate::error::{ConduitError, Result};
use crate::types::{Direction, Position};

/// Result of [`ConduitWorld::remove_type`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoveOutcome {
    /// The position holds no conduit anymore and its endpoint is gone.
    pub bundle_empty: bool,
    /// Filter and upgrade items that were configured on the removed type.
    pub dropped: Vec<Stack>,
}

/// Every node of the world, loaded or parked.
struct WorldNodes<'a> {
    endpoints: &'a mut HashMap<Position, ConduitEndpoint>,
    dormant: &'a mut DormantStore,
}

impl NodeStore for WorldNodes<'_> {
    fn node(&self, key: NodeKey) -> Option<&NodeIdentifier> {
        match self.endpoints.get(&key.position) {
            Some(endpoint) => endpoint.bundle().node_for(key.conduit_type),
            None => self.dormant.get(key),
        }
    }

    fn node_mut(&mut self, key: NodeKey) -> Option<&mut NodeIdentifier> {
        match self.endpoints.get_mut(&key.position) {
            Some(endpoint) => endpoint.bundle_mut().node_for_mut(key.conduit_type),
            None => self.dormant.get_mut(key),
        }
    }
}

/// Outcome of linking one face.
enum Link {
    Conduit(NodeKey),
    End,
    Refused,
}

/**
 * Host-side orchestration of conduit bundles across a world: placement and removal with
 * neighbour linking, network maintenance, unload/reload through the dormant store, and
 * ticking. Unloaded positions keep their serialized record here, standing in for chunk storage.
 */
pub struct ConduitWorld<H: CapabilityResolver> {
    registry: Arc<ConduitTypeRegistry>,
    config: ConduitConfig,
    host: H,
    graphs: GraphArena,
    endpoints: HashMap<Position, ConduitEndpoint>,
    unloaded: HashMap<Position, BundleRecord>,
    dormant: DormantStore,
    ticks: u64,
}

impl<H: CapabilityResolver> ConduitWorld<H> {
    pub fn new(registry: Arc<ConduitTypeRegistry>, config: ConduitConfig, host: H) -> Self {
        Self {
            registry,
            config,
            host,
            graphs: GraphArena::new(),
            endpoints: HashMap::new(),
            unloaded: HashMap::new(),
            dormant: DormantStore::new(),
            ticks: 0,
        }
    }

    pub fn registry(&self) -> &ConduitTypeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ConduitConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn graphs(&self) -> &GraphArena {
        &self.graphs
    }

    pub fn dormant(&self) -> &DormantStore {
        &self.dormant
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn endpoint(&self, position: Position) -> Option<&ConduitEndpoint> {
        self.endpoints.get(&position)
    }

    pub fn bundle(&self, position: Position) -> Option<&ConduitBundle> {
        self.endpoints.get(&position).map(ConduitEndpoint::bundle)
    }

    pub fn is_loaded(&self, position: Position) -> bool {
        self.endpoints.contains_key(&position)
    }

    /// The stored record of an unloaded position.
    pub fn unloaded_record(&self, position: Position) -> Option<&BundleRecord> {
        self.unloaded.get(&position)
    }

    fn node(&self, key: NodeKey) -> Option<&NodeIdentifier> {
        match self.endpoints.get(&key.position) {
            Some(endpoint) => endpoint.bundle().node_for(key.conduit_type),
            None => self.dormant.get(key),
        }
    }

    /// The live network of the node of `conduit_type` at `position`, loaded or dormant.
    pub fn owning_graph(&self, position: Position, conduit_type: ConduitTypeId) -> Option<GraphId> {
        self.node(NodeKey::new(conduit_type, position))
            .and_then(NodeIdentifier::graph)
            .filter(|id| self.graphs.contains(*id))
    }

    pub fn members(&self, graph: GraphId) -> Vec<Position> {
        self.graphs
            .get(graph)
            .map(|graph| graph.positions().iter().copied().collect())
            .unwrap_or_default()
    }

    fn graphs_and_nodes(&mut self) -> (&mut GraphArena, WorldNodes<'_>) {
        (
            &mut self.graphs,
            WorldNodes {
                endpoints: &mut self.endpoints,
                dormant: &mut self.dormant,
            },
        )
    }

    fn integrate(&mut self, key: NodeKey, neighbors: &[NodeKey]) -> Option<GraphId> {
        let (graphs, mut nodes) = self.graphs_and_nodes();
        let id = graphs.integrate(&mut nodes, key, neighbors)?;
        self.dormant.register_pending_graph(key.conduit_type, id);
        Some(id)
    }

    /// Rejects ids minted by another registry.
    fn check_type(&self, conduit_type: ConduitTypeId) -> Result<()> {
        match self.registry.get(conduit_type) {
            Some(_) => Ok(()),
            None => Err(ConduitError::UnknownType(conduit_type.to_string())),
        }
    }

    fn refresh(&mut self, position: Position) {
        if let Some(endpoint) = self.endpoints.get_mut(&position) {
            endpoint.update_client();
        }
    }

    /// Places `conduit_type` at `position`, links it to its neighbours and merges their
    /// networks. An upgrade first tears down the links of the type it replaced.
    pub fn add_type(
        &mut self,
        position: Position,
        conduit_type: ConduitTypeId,
        actor: Option<&Actor>,
    ) -> Result<AddOutcome> {
        self.check_type(conduit_type)?;
        if self.unloaded.contains_key(&position) {
            return Err(ConduitError::NoEndpoint(position));
        }

        let registry = Arc::clone(&self.registry);
        let endpoint = self
            .endpoints
            .entry(position)
            .or_insert_with(|| ConduitEndpoint::new(ConduitBundle::new(position)));
        let outcome = endpoint
            .bundle_mut()
            .add_type(&registry, &mut self.graphs, conduit_type, actor);

        match outcome {
            AddOutcome::Blocked => {
                if endpoint.bundle().is_empty() {
                    self.endpoints.remove(&position);
                }
                return Ok(outcome);
            }
            AddOutcome::Upgrade { replaced } => {
                let mut affected = Vec::new();
                for direction in Direction::ALL {
                    let neighbor = position.relative(direction);
                    if self.is_linked(neighbor, direction.opposite(), replaced) {
                        affected.extend(self.sever_remote(neighbor, direction.opposite(), replaced));
                    }
                }
                self.rederive(affected);
            }
            AddOutcome::Insert => {}
        }

        let mut neighbors = Vec::new();
        for direction in Direction::ALL {
            if let Link::Conduit(neighbor) = self.link(position, direction, conduit_type) {
                neighbors.push(neighbor);
            }
        }
        self.integrate(NodeKey::new(conduit_type, position), &neighbors);
        self.refresh(position);
        Ok(outcome)
    }

    /// Links `conduit_type` across one face: both ways to a neighbouring conduit of the same
    /// type, one way to a plain block offering the capability.
    fn link(&mut self, position: Position, direction: Direction, conduit_type: ConduitTypeId) -> Link {
        let neighbor = position.relative(direction);
        let neighbor_loaded = self.endpoints.contains_key(&neighbor);
        let conduit_neighbor = self
            .bundle(neighbor)
            .is_some_and(|bundle| bundle.node_for(conduit_type).is_some());

        if conduit_neighbor {
            if let Some(endpoint) = self.endpoints.get_mut(&neighbor) {
                endpoint
                    .bundle_mut()
                    .connect_to(direction.opposite(), conduit_type, false);
                endpoint.update_client();
            }
            if let Some(endpoint) = self.endpoints.get_mut(&position) {
                endpoint.bundle_mut().connect_to(direction, conduit_type, false);
            }
            trace!(%position, %direction, %conduit_type, "linked to conduit");
            return Link::Conduit(NodeKey::new(conduit_type, neighbor));
        }

        let plain_block = !neighbor_loaded && !self.unloaded.contains_key(&neighbor);
        if plain_block
            && self.registry[conduit_type]
                .ticker()
                .can_connect_to(&self.host, position, direction)
        {
            if let Some(endpoint) = self.endpoints.get_mut(&position) {
                endpoint.bundle_mut().connect_to(direction, conduit_type, true);
            }
            trace!(%position, %direction, %conduit_type, "linked to end");
            return Link::End;
        }

        Link::Refused
    }

    /// Disables the link of `conduit_type` that `neighbor` holds across `toward`, loaded or
    /// not, and returns the network the neighbour's node is in.
    fn sever_remote(
        &mut self,
        neighbor: Position,
        toward: Direction,
        conduit_type: ConduitTypeId,
    ) -> Option<GraphId> {
        if let Some(endpoint) = self.endpoints.get_mut(&neighbor) {
            let previous = endpoint.bundle_mut().disconnect_from(toward, conduit_type);
            if previous.is_some_and(|state| state.is_connected()) {
                endpoint.update_client();
            }
            return endpoint
                .bundle()
                .node_for(conduit_type)
                .and_then(NodeIdentifier::graph);
        }

        let record = self.unloaded.get_mut(&neighbor)?;
        let key = self.registry[conduit_type].key();
        if let Some(index) = record.types.iter().position(|stored| stored == key) {
            if let Some(state) = record
                .connections
                .get_mut(&toward)
                .and_then(|states| states.get_mut(index))
            {
                *state = ConnectionState::Disabled;
            }
        }
        self.dormant
            .get(NodeKey::new(conduit_type, neighbor))
            .and_then(NodeIdentifier::graph)
    }

    fn is_linked(&self, position: Position, direction: Direction, conduit_type: ConduitTypeId) -> bool {
        if let Some(endpoint) = self.endpoints.get(&position) {
            return endpoint.bundle().is_connected_to(direction, conduit_type);
        }
        self.unloaded.get(&position).is_some_and(|record| {
            record
                .connection_state(direction, self.registry[conduit_type].key())
                .is_some_and(ConnectionState::is_connected)
        })
    }

    /// Nodes of the same type that `key` is linked to from both sides.
    fn linked_neighbors(&self, key: NodeKey) -> Vec<NodeKey> {
        Direction::ALL
            .into_iter()
            .filter(|direction| self.is_linked(key.position, *direction, key.conduit_type))
            .map(|direction| (direction, NodeKey::new(key.conduit_type, key.position.relative(direction))))
            .filter(|(direction, neighbor)| {
                self.node(*neighbor).is_some()
                    && self.is_linked(neighbor.position, direction.opposite(), neighbor.conduit_type)
            })
            .map(|(_, neighbor)| neighbor)
            .collect()
    }

    /// Rebuilds the given networks from the links their members still hold. Every former
    /// member ends up in exactly one network.
    fn rederive(&mut self, graphs: impl IntoIterator<Item = GraphId>) {
        let unique: BTreeSet<GraphId> = graphs.into_iter().collect();
        let mut former = Vec::new();
        for id in unique {
            let (graphs, mut nodes) = self.graphs_and_nodes();
            former.extend(graphs.dissolve(&mut nodes, id));
        }
        if former.is_empty() {
            return;
        }

        debug!(members = former.len(), "re-deriving conduit networks");
        for key in former {
            let neighbors = self.linked_neighbors(key);
            self.integrate(key, &neighbors);
        }
    }

    /// Removes `conduit_type` from `position`, unlinking it from its neighbours and splitting
    /// networks that depended on it. The endpoint goes away once its bundle is empty.
    pub fn remove_type(&mut self, position: Position, conduit_type: ConduitTypeId) -> Result<RemoveOutcome> {
        self.check_type(conduit_type)?;
        let registry = Arc::clone(&self.registry);
        let strict = self.config.strict;
        let endpoint = self
            .endpoints
            .get_mut(&position)
            .ok_or(ConduitError::NoEndpoint(position))?;

        if !endpoint.bundle().contains(conduit_type) {
            let bundle_empty = endpoint
                .bundle_mut()
                .remove_type(&registry, &mut self.graphs, conduit_type, strict)?;
            return Ok(RemoveOutcome {
                bundle_empty,
                dropped: Vec::new(),
            });
        }

        let dropped = endpoint.bundle().dropped_items(conduit_type);
        let linked = endpoint.bundle().connected_directions(conduit_type);
        let own = endpoint
            .bundle()
            .node_for(conduit_type)
            .and_then(NodeIdentifier::graph);

        let mut affected: Vec<GraphId> = own.into_iter().collect();
        for direction in linked {
            affected.extend(self.sever_remote(
                position.relative(direction),
                direction.opposite(),
                conduit_type,
            ));
        }

        let Some(endpoint) = self.endpoints.get_mut(&position) else {
            return Err(ConduitError::NoEndpoint(position));
        };
        let bundle_empty = endpoint
            .bundle_mut()
            .remove_type(&registry, &mut self.graphs, conduit_type, strict)?;
        self.rederive(affected);

        if bundle_empty {
            self.endpoints.remove(&position);
            debug!(%position, "conduit bundle emptied");
        } else {
            self.refresh(position);
        }
        Ok(RemoveOutcome {
            bundle_empty,
            dropped,
        })
    }

    /// Links `conduit_type` across `direction` on demand. Returns whether a link exists now.
    pub fn connect(&mut self, position: Position, direction: Direction, conduit_type: ConduitTypeId) -> Result<bool> {
        self.check_type(conduit_type)?;
        let bundle = self.bundle(position).ok_or(ConduitError::NoEndpoint(position))?;
        if !bundle.contains(conduit_type) {
            return Ok(false);
        }

        let linked = match self.link(position, direction, conduit_type) {
            Link::Conduit(neighbor) => {
                self.integrate(NodeKey::new(conduit_type, position), &[neighbor]);
                true
            }
            Link::End => true,
            Link::Refused => false,
        };
        self.refresh(position);
        Ok(linked)
    }

    /// Unlinks `conduit_type` across `direction` on both sides and splits the network if the
    /// link was the only path between its halves. Returns whether a link was removed.
    pub fn disconnect(&mut self, position: Position, direction: Direction, conduit_type: ConduitTypeId) -> Result<bool> {
        self.check_type(conduit_type)?;
        let endpoint = self
            .endpoints
            .get_mut(&position)
            .ok_or(ConduitError::NoEndpoint(position))?;
        let previous = endpoint.bundle_mut().disconnect_from(direction, conduit_type);
        if !previous.is_some_and(|state| state.is_connected()) {
            return Ok(false);
        }

        let own = self.owning_graph(position, conduit_type);
        let remote = self.sever_remote(position.relative(direction), direction.opposite(), conduit_type);
        self.rederive(own.into_iter().chain(remote));
        self.refresh(position);
        debug!(%position, %direction, %conduit_type, "disconnected");
        Ok(true)
    }

    /// Edits the dynamic link of `conduit_type` across `direction`. Disabled and enabled links
    /// are not configurable and yield `false`.
    pub fn configure_connection<F>(
        &mut self,
        position: Position,
        direction: Direction,
        conduit_type: ConduitTypeId,
        configure: F,
    ) -> Result<bool>
    where
        F: FnOnce(&mut DynamicConnectionState),
    {
        self.check_type(conduit_type)?;
        let endpoint = self
            .endpoints
            .get_mut(&position)
            .ok_or(ConduitError::NoEndpoint(position))?;
        let Some(state) = endpoint.bundle_mut().dynamic_state_mut(direction, conduit_type) else {
            return Ok(false);
        };
        configure(state);
        endpoint.bundle_mut().mark_dirty();
        endpoint.update_client();
        Ok(true)
    }

    pub fn set_facade(&mut self, position: Position, direction: Direction, facade: Option<Facade>) -> Result<()> {
        let endpoint = self
            .endpoints
            .get_mut(&position)
            .ok_or(ConduitError::NoEndpoint(position))?;
        match facade {
            Some(facade) => endpoint.bundle_mut().set_facade(direction, facade),
            None => {
                endpoint.bundle_mut().clear_facade(direction);
            }
        }
        endpoint.update_client();
        Ok(())
    }

    /// Runs `f` against the item-slot view of the bundle at `position`.
    pub fn with_item_slots<R>(
        &mut self,
        position: Position,
        f: impl FnOnce(&mut ConduitItemSlots<'_>) -> R,
    ) -> Result<R> {
        let registry = Arc::clone(&self.registry);
        let endpoint = self
            .endpoints
            .get_mut(&position)
            .ok_or(ConduitError::NoEndpoint(position))?;
        let result = f(&mut ConduitItemSlots::new(&registry, endpoint.bundle_mut()));
        endpoint.update_client();
        Ok(result)
    }

    /// Serialized form of a loaded bundle.
    pub fn save(&self, position: Position) -> Result<Vec<u8>> {
        self.bundle(position)
            .ok_or(ConduitError::NoEndpoint(position))?
            .to_bytes(&self.registry)
    }

    /// Unloads `position`: its record is stored and its nodes are parked with their network
    /// membership intact.
    pub fn unload(&mut self, position: Position) -> Result<()> {
        let endpoint = self
            .endpoints
            .remove(&position)
            .ok_or(ConduitError::NoEndpoint(position))?;
        let mut bundle = endpoint.into_bundle();
        let record = bundle.to_record(&self.registry);

        for conduit_type in bundle.types().to_vec() {
            if let Some(mut node) = bundle.take_node_for(conduit_type) {
                node.data_mut()
                    .on_removed(&self.registry[conduit_type], position);
                self.dormant.put(NodeKey::new(conduit_type, position), node);
            }
        }
        self.unloaded.insert(position, record);
        debug!(%position, "conduit bundle unloaded");
        Ok(())
    }

    /// Reloads an unloaded position, reclaiming its parked nodes before anything is probed.
    /// Nodes that were never parked are integrated from their stored links.
    pub fn load(&mut self, position: Position) -> Result<()> {
        let record = self
            .unloaded
            .get(&position)
            .cloned()
            .ok_or(ConduitError::NoEndpoint(position))?;
        let mut bundle = ConduitBundle::from_record(&self.registry, position, record)?;
        self.unloaded.remove(&position);

        let mut fresh = Vec::new();
        for conduit_type in bundle.types().to_vec() {
            let key = NodeKey::new(conduit_type, position);
            match self.dormant.take(key) {
                Some(node) => {
                    bundle.set_node_for(conduit_type, node);
                }
                None => fresh.push(key),
            }
        }
        // Parked nodes of types the record no longer holds cannot come back.
        let stale: Vec<NodeKey> = self
            .registry
            .iter()
            .map(|descriptor| NodeKey::new(descriptor.id(), position))
            .filter(|key| !bundle.contains(key.conduit_type) && self.dormant.contains(*key))
            .collect();

        bundle.on_load(&self.registry);
        self.endpoints
            .insert(position, ConduitEndpoint::new(bundle));

        for key in stale {
            if let Some(mut node) = self.dormant.take(key) {
                let graph = node.graph();
                self.graphs.remove(&mut node);
                self.rederive(graph);
            }
        }

        let types = self.bundle(position).map(|bundle| bundle.types().to_vec()).unwrap_or_default();
        for conduit_type in types {
            let key = NodeKey::new(conduit_type, position);
            match self.owning_graph(position, conduit_type) {
                Some(id) if !fresh.contains(&key) => {
                    self.dormant.register_pending_graph(conduit_type, id);
                }
                _ => {
                    let neighbors = self.linked_neighbors(key);
                    self.integrate(key, &neighbors);
                }
            }
        }
        self.refresh(position);
        debug!(%position, "conduit bundle loaded");
        Ok(())
    }

    /// Restores a position from its serialized form, as read from chunk storage. Bytes that do
    /// not parse leave the position as it was.
    pub fn load_bytes(&mut self, position: Position, bytes: &[u8]) -> Result<()> {
        let record: BundleRecord = serde_json::from_slice(bytes)?;
        if self.endpoints.contains_key(&position) {
            self.unload(position)?;
        }
        self.unloaded.insert(position, record);
        self.load(position)
    }

    /// Permanently abandons an unloaded position: its parked nodes leave their networks and
    /// neighbours drop their links to it.
    pub fn forget(&mut self, position: Position) -> Result<()> {
        let record = self
            .unloaded
            .remove(&position)
            .ok_or(ConduitError::NoEndpoint(position))?;

        let mut affected = Vec::new();
        for key in &record.types {
            let Some(conduit_type) = self.registry.by_key(key) else {
                continue;
            };
            if let Some(mut node) = self.dormant.take(NodeKey::new(conduit_type, position)) {
                affected.extend(node.graph());
                self.graphs.remove(&mut node);
            }
            for direction in Direction::ALL {
                let linked = record
                    .connection_state(direction, key)
                    .is_some_and(ConnectionState::is_connected);
                if linked {
                    affected.extend(self.sever_remote(
                        position.relative(direction),
                        direction.opposite(),
                        conduit_type,
                    ));
                }
            }
        }
        self.rederive(affected);
        debug!(%position, "abandoned unloaded conduit bundle");
        Ok(())
    }

    /// Advances one simulation step and ticks every live network of each type whose tick rate
    /// divides the step count. Returns how many networks ran their transfer routine.
    pub fn tick(&mut self) -> usize {
        self.ticks += 1;
        let registry = Arc::clone(&self.registry);
        let mut changed = BTreeSet::new();
        let mut transfers = 0;

        for descriptor in registry.iter() {
            let ticker = descriptor.ticker();
            if self.ticks % ticker.tick_rate() != 0 {
                continue;
            }

            for id in self.dormant.live_networks(descriptor.id(), &self.graphs) {
                let members = self.members(id);
                let Some(cursor) = self.graphs.cursor_mut(id) else {
                    continue;
                };
                let mut view = NetworkView::new(descriptor.id(), id, members, &mut self.endpoints);
                if ticker.tick_network(&mut view, cursor, &mut self.host) {
                    transfers += 1;
                }
                changed.extend(view.into_changed());
            }
        }

        for position in changed {
            if let Some(endpoint) = self.endpoints.get_mut(&position) {
                endpoint.bundle_mut().mark_dirty();
                endpoint.update_client();
            }
        }
        if transfers > 0 {
            trace!(tick = self.ticks, transfers, "tick");
        }
        transfers
    }

    /// Positions whose bundle changed since the last call, for persistence.
    pub fn take_dirty(&mut self) -> Vec<Position> {
        let mut dirty: Vec<Position> = self
            .endpoints
            .iter_mut()
            .filter_map(|(position, endpoint)| endpoint.bundle_mut().take_dirty().then_some(*position))
            .collect();
        dirty.sort();
        dirty
    }

    /// Drops every loaded and unloaded position and all networks.
    pub fn clear(&mut self) {
        info!(
            loaded = self.endpoints.len(),
            unloaded = self.unloaded.len(),
            networks = self.graphs.len(),
            "clearing conduit world"
        );
        self.endpoints.clear();
        self.unloaded.clear();
        self.dormant.clear();
        self.graphs = GraphArena::new();
    }
}
