use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use proptest::prelude::*;

use crate::conduits::host::InMemoryHost;
use crate::conduits::{
    AddOutcome, BundleRecord, ConduitBundle, ConduitTicker, ConduitTypeBuilder, ConduitTypeId,
    ConduitTypeRegistry, ConduitWorld, ConnectionState, DynamicConnectionState, EmptyConduitData,
    Facade, GraphArena, NodeIdentifier, NodeKey, NodeStore, RedstoneTicker, Stack,
};
use crate::config::ConduitConfig;
use crate::types::{Direction, Position};

#[derive(Default)]
struct MapStore(HashMap<NodeKey, NodeIdentifier>);

impl MapStore {
    fn with(keys: &[NodeKey]) -> Self {
        let mut store = MapStore::default();
        for key in keys {
            store
                .0
                .insert(*key, NodeIdentifier::new(key.position, Box::new(EmptyConduitData)));
        }
        store
    }
}

impl NodeStore for MapStore {
    fn node(&self, key: NodeKey) -> Option<&NodeIdentifier> {
        self.0.get(&key)
    }

    fn node_mut(&mut self, key: NodeKey) -> Option<&mut NodeIdentifier> {
        self.0.get_mut(&key)
    }
}

fn key(x: i32) -> NodeKey {
    NodeKey::new(ConduitTypeId::from_raw(0), Position::new(x, 0, 0))
}

/// Groups neighbours 1..=n into networks, then joins node 0 with them in `order`.
fn join(groups: &[u8], order: &[usize]) -> (GraphArena, BTreeSet<Position>) {
    let keys: Vec<NodeKey> = (0..=groups.len() as i32).map(key).collect();
    let mut store = MapStore::with(&keys);
    let mut arena = GraphArena::new();

    let mut heads: BTreeMap<u8, NodeKey> = BTreeMap::new();
    for (offset, group) in groups.iter().enumerate() {
        let member = keys[offset + 1];
        let neighbors: Vec<NodeKey> = heads.get(group).copied().into_iter().collect();
        arena.integrate(&mut store, member, &neighbors);
        heads.entry(*group).or_insert(member);
    }

    let neighbors: Vec<NodeKey> = order.iter().map(|i| keys[i + 1]).collect();
    let id = arena.integrate(&mut store, keys[0], &neighbors).unwrap();
    let members = arena.get(id).unwrap().positions().clone();
    (arena, members)
}

fn plain_registry() -> ConduitTypeRegistry {
    let mut registry = ConduitTypeRegistry::new();
    for index in 0..9 {
        registry
            .register(ConduitTypeBuilder::new(
                format!("plain{index}"),
                ConduitTicker::Graph(Box::new(RedstoneTicker::new(5))),
            ))
            .unwrap();
    }
    registry
}

fn stack() -> impl Strategy<Value = Stack> {
    (0..8u16, 0..64u16).prop_map(|(item_type, count)| Stack::new(item_type, count))
}

fn connection_state() -> impl Strategy<Value = ConnectionState> {
    prop_oneof![
        Just(ConnectionState::Disabled),
        Just(ConnectionState::Enabled),
        (
            any::<bool>(),
            any::<bool>(),
            prop::option::of(stack()),
            prop::option::of(stack()),
        )
            .prop_map(|(is_insert, is_extract, filter_insert, upgrade_extract)| {
                ConnectionState::Dynamic(DynamicConnectionState {
                    is_insert,
                    is_extract,
                    filter_insert,
                    upgrade_extract,
                    ..DynamicConnectionState::default()
                })
            }),
    ]
}

fn bundle_record() -> impl Strategy<Value = BundleRecord> {
    let keys: Vec<String> = (0..9)
        .map(|index| format!("plain{index}"))
        .chain(["ghost".to_string()])
        .collect();
    (
        prop::collection::vec(prop::sample::select(keys), 0..12),
        prop::collection::vec(prop::collection::vec(connection_state(), 0..12), 6),
        prop::collection::vec(prop::option::of("[a-z]{1,6}"), 6),
    )
        .prop_map(|(types, sequences, facades)| BundleRecord {
            types,
            connections: Direction::ALL.into_iter().zip(sequences).collect(),
            facades: Direction::ALL
                .into_iter()
                .zip(facades)
                .filter_map(|(direction, facade)| Some((direction, Facade(facade?))))
                .collect(),
            nodes: Vec::new(),
        })
}

fn marker(conduit_type: ConduitTypeId) -> Direction {
    Direction::ALL[conduit_type.index() % Direction::ALL.len()]
}

/// Connected components of `cells` under face adjacency.
fn components(cells: &BTreeSet<Position>) -> BTreeMap<Position, usize> {
    let mut component = BTreeMap::new();
    let mut next = 0;
    for start in cells {
        if component.contains_key(start) {
            continue;
        }
        let mut queue = VecDeque::from([*start]);
        component.insert(*start, next);
        while let Some(cell) = queue.pop_front() {
            for direction in Direction::ALL {
                let neighbor = cell.relative(direction);
                if cells.contains(&neighbor) && !component.contains_key(&neighbor) {
                    component.insert(neighbor, next);
                    queue.push_back(neighbor);
                }
            }
        }
        next += 1;
    }
    component
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn merge_result_ignores_neighbor_order(
        (groups, order) in prop::collection::vec(0..3u8, 1..8).prop_flat_map(|groups| {
            let order: Vec<usize> = (0..groups.len()).collect();
            (Just(groups), Just(order).prop_shuffle())
        })
    ) {
        let forward: Vec<usize> = (0..groups.len()).collect();
        let (arena, expected) = join(&groups, &forward);
        let (shuffled_arena, members) = join(&groups, &order);

        prop_assert_eq!(&members, &expected);
        prop_assert_eq!(members.len(), groups.len() + 1);
        prop_assert_eq!(arena.len(), 1);
        prop_assert_eq!(shuffled_arena.len(), 1);
    }

    #[test]
    fn removal_leaves_one_network_per_component(
        cells in prop::collection::btree_set((0..4i32, 0..4i32), 1..16),
        pick in any::<prop::sample::Index>(),
    ) {
        let config = ConduitConfig::default();
        let registry = ConduitTypeRegistry::ender_defaults(&config).unwrap();
        let power = registry.require("power1").unwrap();
        let mut world = ConduitWorld::new(Arc::new(registry), config, InMemoryHost::new());

        let cells: BTreeSet<Position> = cells
            .into_iter()
            .map(|(x, y)| Position::new(x, y, 0))
            .collect();
        for cell in &cells {
            prop_assert_eq!(world.add_type(*cell, power, None).unwrap(), AddOutcome::Insert);
        }

        let removed = *pick.get(&cells.iter().copied().collect::<Vec<_>>());
        world.remove_type(removed, power).unwrap();
        let remaining: BTreeSet<Position> = cells.into_iter().filter(|cell| *cell != removed).collect();
        let component = components(&remaining);

        for a in &remaining {
            let graph = world.owning_graph(*a, power);
            prop_assert!(graph.is_some());
            let expected: Vec<Position> = remaining
                .iter()
                .filter(|b| component[*b] == component[a])
                .copied()
                .collect();
            prop_assert_eq!(world.members(graph.unwrap()), expected);
        }
        let networks = component.values().collect::<BTreeSet<_>>().len();
        prop_assert_eq!(world.graphs().len(), networks);
    }

    #[test]
    fn restored_bundle_saves_identically(record in bundle_record()) {
        let registry = plain_registry();
        let position = Position::new(3, 1, -2);

        let bundle = ConduitBundle::from_record(&registry, position, record).unwrap();
        let saved = bundle.to_bytes(&registry).unwrap();
        let restored = ConduitBundle::from_bytes(&registry, position, &saved).unwrap();

        prop_assert_eq!(restored.types(), bundle.types());
        prop_assert_eq!(restored.to_bytes(&registry).unwrap(), saved);
        for direction in Direction::ALL {
            prop_assert_eq!(restored.connection(direction).len(), restored.types().len());
        }
    }

    #[test]
    fn connection_states_follow_their_types(
        ops in prop::collection::vec((0..5usize, any::<bool>()), 1..40)
    ) {
        let registry = ConduitTypeRegistry::ender_defaults(&ConduitConfig::default()).unwrap();
        let ids: Vec<ConduitTypeId> = registry.iter().map(|ty| ty.id()).collect();
        let mut graphs = GraphArena::new();
        let mut bundle = ConduitBundle::new(Position::new(0, 0, 0));

        for (which, add) in ops {
            let conduit_type = ids[which];
            if add {
                if bundle.add_type(&registry, &mut graphs, conduit_type, None) != AddOutcome::Blocked {
                    bundle.connect_to(marker(conduit_type), conduit_type, true);
                }
            } else {
                bundle.remove_type(&registry, &mut graphs, conduit_type, false).unwrap();
            }

            let types = bundle.types();
            let sorted = types
                .windows(2)
                .all(|pair| registry.sort_index(pair[0]) < registry.sort_index(pair[1]));
            prop_assert!(sorted);
            for direction in Direction::ALL {
                prop_assert_eq!(bundle.connection(direction).len(), types.len());
            }
            for conduit_type in types {
                for direction in Direction::ALL {
                    let expected = if direction == marker(*conduit_type) {
                        ConnectionState::Enabled
                    } else {
                        ConnectionState::Disabled
                    };
                    prop_assert_eq!(bundle.connection_state(direction, *conduit_type), Some(&expected));
                }
            }
        }
    }
}
