use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::trace;

use crate::conduits::distribution::RoundRobin;
use crate::conduits::{
    CapabilityHandle, CapabilityKind, CapabilityResolver, ConduitEndpoint, ConduitTypeId,
    ConnectionState, ExtendedConduitData, GraphId, Stack,
};
use crate::types::{Direction, Position};

/// One insert- or extract-capable face of a network member, with the configuration that
/// applies to that role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    /// The conduit the link starts from.
    pub position: Position,
    pub direction: Direction,
    pub filter: Option<Stack>,
    pub upgrade: Option<Stack>,
}

impl Connection {
    /// The block on the other side of the link.
    pub fn neighbor(&self) -> Position {
        self.position.relative(self.direction)
    }
}

/// A [`Connection`] whose neighbour exposed the capability the network needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityConnection {
    pub handle: CapabilityHandle,
    pub connection: Connection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Insert,
    Extract,
}

/// What a ticker sees of one network during its pass: the loaded members, their links and
/// their payloads.
pub struct NetworkView<'a> {
    conduit_type: ConduitTypeId,
    graph: GraphId,
    members: Vec<Position>,
    endpoints: &'a mut HashMap<Position, ConduitEndpoint>,
    changed: BTreeSet<Position>,
}

impl<'a> NetworkView<'a> {
    pub(crate) fn new(
        conduit_type: ConduitTypeId,
        graph: GraphId,
        members: Vec<Position>,
        endpoints: &'a mut HashMap<Position, ConduitEndpoint>,
    ) -> Self {
        Self {
            conduit_type,
            graph,
            members,
            endpoints,
            changed: BTreeSet::new(),
        }
    }

    pub fn conduit_type(&self) -> ConduitTypeId {
        self.conduit_type
    }

    pub fn graph(&self) -> GraphId {
        self.graph
    }

    /// Every member position, loaded or not.
    pub fn members(&self) -> &[Position] {
        &self.members
    }

    /// Faces that may push resources into their neighbour.
    pub fn inserts(&self) -> Vec<Connection> {
        self.collect(Role::Insert)
    }

    /// Faces that may pull resources out of their neighbour.
    pub fn extracts(&self) -> Vec<Connection> {
        self.collect(Role::Extract)
    }

    fn collect(&self, role: Role) -> Vec<Connection> {
        let mut connections = Vec::new();
        for position in &self.members {
            let Some(endpoint) = self.endpoints.get(position) else {
                continue;
            };
            let bundle = endpoint.bundle();
            for direction in Direction::ALL {
                let Some(state) = bundle.connection_state(direction, self.conduit_type) else {
                    continue;
                };
                let (enabled, filter, upgrade) = match (role, state) {
                    (_, ConnectionState::Disabled) => (false, None, None),
                    (_, ConnectionState::Enabled) => (true, None, None),
                    (Role::Insert, ConnectionState::Dynamic(dynamic)) => (
                        dynamic.is_insert,
                        dynamic.filter_insert.clone(),
                        dynamic.upgrade_extract.clone(),
                    ),
                    (Role::Extract, ConnectionState::Dynamic(dynamic)) => (
                        dynamic.is_extract,
                        dynamic.filter_extract.clone(),
                        dynamic.upgrade_extract.clone(),
                    ),
                };
                if enabled {
                    connections.push(Connection {
                        position: *position,
                        direction,
                        filter,
                        upgrade,
                    });
                }
            }
        }
        connections
    }

    pub fn data(&self, position: Position) -> Option<&dyn ExtendedConduitData> {
        self.endpoints
            .get(&position)?
            .bundle()
            .node_for(self.conduit_type)
            .map(|node| node.data())
    }

    /// Mutable payload of a loaded member. The member is refreshed for observers after the pass.
    pub fn data_mut(&mut self, position: Position) -> Option<&mut dyn ExtendedConduitData> {
        let node = self
            .endpoints
            .get_mut(&position)?
            .bundle_mut()
            .node_for_mut(self.conduit_type)?;
        self.changed.insert(position);
        Some(node.data_mut())
    }

    pub(crate) fn into_changed(self) -> BTreeSet<Position> {
        self.changed
    }
}

/// Transfer policy of a capability-aware conduit type. The engine resolves endpoints; the
/// policy only decides how much moves where.
pub trait CapabilityTicker: Send + Sync {
    fn capability(&self) -> CapabilityKind;

    /// How often the network ticks. 1 is every step, 5 is every 5th step.
    fn tick_rate(&self) -> u64 {
        5
    }

    /// Moves resources. Only called when both sides hold at least one resolved endpoint.
    /// `cursor` belongs to the network being ticked.
    fn tick_capability_graph(
        &self,
        inserts: &[CapabilityConnection],
        extracts: &[CapabilityConnection],
        cursor: &mut RoundRobin,
        host: &mut dyn CapabilityResolver,
    );
}

/// A conduit type that ticks its network itself, from the unresolved connection graph.
pub trait GraphTicker: Send + Sync {
    fn tick_rate(&self) -> u64 {
        5
    }

    fn tick_graph(&self, network: &mut NetworkView<'_>, host: &mut dyn CapabilityResolver);

    fn can_connect_to(
        &self,
        _host: &dyn CapabilityResolver,
        _position: Position,
        _direction: Direction,
    ) -> bool {
        false
    }
}

/// How a conduit type ticks: both strategies share cadence and per-network granularity.
pub enum ConduitTicker {
    Capability(Box<dyn CapabilityTicker>),
    Graph(Box<dyn GraphTicker>),
}

impl fmt::Debug for ConduitTicker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConduitTicker::Capability(ticker) => f
                .debug_tuple("Capability")
                .field(&ticker.capability())
                .finish(),
            ConduitTicker::Graph(_) => f.write_str("Graph"),
        }
    }
}

impl ConduitTicker {
    pub fn tick_rate(&self) -> u64 {
        let rate = match self {
            ConduitTicker::Capability(ticker) => ticker.tick_rate(),
            ConduitTicker::Graph(ticker) => ticker.tick_rate(),
        };
        rate.max(1)
    }

    /// Whether the block across `direction` is an endpoint this type can link to as an end.
    pub fn can_connect_to(
        &self,
        host: &dyn CapabilityResolver,
        position: Position,
        direction: Direction,
    ) -> bool {
        match self {
            ConduitTicker::Capability(ticker) => host
                .resolve(
                    position.relative(direction),
                    direction.opposite(),
                    ticker.capability(),
                )
                .is_some(),
            ConduitTicker::Graph(ticker) => ticker.can_connect_to(host, position, direction),
        }
    }

    /// Runs one pass over a network. Returns whether the transfer routine was invoked.
    pub fn tick_network(
        &self,
        network: &mut NetworkView<'_>,
        cursor: &mut RoundRobin,
        host: &mut dyn CapabilityResolver,
    ) -> bool {
        match self {
            ConduitTicker::Capability(ticker) => {
                let kind = ticker.capability();
                let inserts = resolve_all(network.inserts(), kind, host);
                if inserts.is_empty() {
                    return false;
                }
                let extracts = resolve_all(network.extracts(), kind, host);
                if extracts.is_empty() {
                    return false;
                }

                trace!(
                    graph = ?network.graph(),
                    inserts = inserts.len(),
                    extracts = extracts.len(),
                    "capability transfer"
                );
                ticker.tick_capability_graph(&inserts, &extracts, cursor, host);
                true
            }
            ConduitTicker::Graph(ticker) => {
                ticker.tick_graph(network, host);
                true
            }
        }
    }
}

fn resolve_all(
    connections: Vec<Connection>,
    kind: CapabilityKind,
    host: &dyn CapabilityResolver,
) -> Vec<CapabilityConnection> {
    connections
        .into_iter()
        .filter_map(|connection| {
            host.resolve(connection.neighbor(), connection.direction.opposite(), kind)
                .map(|handle| CapabilityConnection { handle, connection })
        })
        .collect()
}
