//! Built-in transfer policies.

use tracing::{debug, trace};

use crate::conduits::capability::{energy_mut, items_mut, redstone_mut};
use crate::conduits::distribution::{RoundRobin, distribute, drain};
use crate::conduits::{
    CapabilityConnection, CapabilityKind, CapabilityResolver, CapabilityTicker, GraphTicker,
    NetworkView, RedstoneConduitData, Stack,
};
use crate::types::{Direction, Position};

/// Moves energy from every extract endpoint into the insert endpoints, spread evenly with the
/// remainder handed out round robin.
#[derive(Debug)]
pub struct EnergyTicker {
    /// Energy a network may move per step; a pass moves `transfer_rate * tick_rate`.
    transfer_rate: u64,
    tick_rate: u64,
}

impl EnergyTicker {
    pub fn new(transfer_rate: u64, tick_rate: u64) -> Self {
        Self {
            transfer_rate,
            tick_rate: tick_rate.max(1),
        }
    }

    pub fn transfer_rate(&self) -> u64 {
        self.transfer_rate
    }

    fn budget(&self) -> u64 {
        self.transfer_rate.saturating_mul(self.tick_rate)
    }
}

impl CapabilityTicker for EnergyTicker {
    fn capability(&self) -> CapabilityKind {
        CapabilityKind::Energy
    }

    fn tick_rate(&self) -> u64 {
        self.tick_rate
    }

    fn tick_capability_graph(
        &self,
        inserts: &[CapabilityConnection],
        extracts: &[CapabilityConnection],
        cursor: &mut RoundRobin,
        host: &mut dyn CapabilityResolver,
    ) {
        let budget = self.budget();
        let available: Vec<u64> = extracts
            .iter()
            .map(|source| {
                energy_mut(host, &source.handle)
                    .map_or(0, |storage| storage.extract_energy(budget, true))
            })
            .collect();
        let offered = available.iter().sum::<u64>().min(budget);
        if offered == 0 {
            return;
        }

        let capacities: Vec<u64> = inserts
            .iter()
            .map(|sink| {
                energy_mut(host, &sink.handle)
                    .map_or(0, |storage| storage.receive_energy(offered, true))
            })
            .collect();

        let (shares, unplaced) = distribute(offered, &capacities, &mut cursor.insert);
        let moving = offered - unplaced;
        if moving == 0 {
            return;
        }

        let draws = drain(moving, &available, &mut cursor.extract);

        let mut extracted = 0u64;
        for (source, amount) in extracts.iter().zip(draws) {
            if amount == 0 {
                continue;
            }
            if let Some(storage) = energy_mut(host, &source.handle) {
                extracted += storage.extract_energy(amount, false);
            }
        }

        let mut remaining = extracted;
        for (sink, share) in inserts.iter().zip(shares) {
            let give = share.min(remaining);
            if give == 0 {
                continue;
            }
            if let Some(storage) = energy_mut(host, &sink.handle) {
                remaining -= storage.receive_energy(give, false);
            }
        }

        // Anything a sink refused after all goes back where it came from.
        for source in extracts {
            if remaining == 0 {
                break;
            }
            if let Some(storage) = energy_mut(host, &source.handle) {
                remaining -= storage.receive_energy(remaining, false);
            }
        }
        if remaining > 0 {
            debug!(lost = remaining, "energy could not be returned to its sources");
        }

        trace!(moved = extracted - remaining, "energy transfer");
    }
}

/// Pulls one batch of items per extract endpoint and pushes it into the first insert endpoint,
/// in round robin order, that accepts it.
#[derive(Debug)]
pub struct ItemTicker {
    stack_size: u16,
    tick_rate: u64,
}

impl ItemTicker {
    pub fn new(stack_size: u16, tick_rate: u64) -> Self {
        Self {
            stack_size: stack_size.max(1),
            tick_rate: tick_rate.max(1),
        }
    }

    /// Items one extract endpoint may move per pass; every upgrade item multiplies it.
    pub fn batch_size(&self, upgrade: Option<&Stack>) -> u16 {
        let multiplier = upgrade.map_or(1, |stack| stack.item_count.max(1));
        self.stack_size.saturating_mul(multiplier)
    }
}

impl CapabilityTicker for ItemTicker {
    fn capability(&self) -> CapabilityKind {
        CapabilityKind::Items
    }

    fn tick_rate(&self) -> u64 {
        self.tick_rate
    }

    fn tick_capability_graph(
        &self,
        inserts: &[CapabilityConnection],
        extracts: &[CapabilityConnection],
        cursor: &mut RoundRobin,
        host: &mut dyn CapabilityResolver,
    ) {
        if inserts.is_empty() {
            return;
        }
        let mut next = cursor.insert % inserts.len();

        for source in extracts {
            let batch = self.batch_size(source.connection.upgrade.as_ref());
            let filter = source.connection.filter.as_ref();
            let Some(offer) = items_mut(host, &source.handle)
                .and_then(|handler| handler.extract_stack(batch, filter, true))
            else {
                continue;
            };

            for step in 0..inserts.len() {
                let index = (next + step) % inserts.len();
                let sink = &inserts[index];
                if sink.handle.position == source.handle.position {
                    continue;
                }
                if let Some(wanted) = &sink.connection.filter {
                    if !wanted.can_stack_with(&offer) {
                        continue;
                    }
                }

                let accepted = match items_mut(host, &sink.handle) {
                    Some(handler) => {
                        let rest = handler.insert_stack(offer.clone(), true);
                        offer.item_count - rest.map_or(0, |rest| rest.item_count)
                    }
                    None => 0,
                };
                if accepted == 0 {
                    continue;
                }

                let Some(taken) = items_mut(host, &source.handle)
                    .and_then(|handler| handler.extract_stack(accepted, Some(&offer), false))
                else {
                    break;
                };
                let rest = items_mut(host, &sink.handle)
                    .and_then(|handler| handler.insert_stack(taken.clone(), false));
                if let Some(rest) = rest.filter(|rest| !rest.is_empty()) {
                    if let Some(handler) = items_mut(host, &source.handle) {
                        handler.insert_stack(rest, false);
                    }
                }

                trace!(
                    from = %source.handle.position,
                    to = %sink.handle.position,
                    items = taken.item_count,
                    "item transfer"
                );
                next = (index + 1) % inserts.len();
                break;
            }
        }

        cursor.insert = next;
    }
}

/// Redstone networks are a shared wire: any emitting extract neighbour powers every insert
/// neighbour, and each member records whether the network is active.
#[derive(Debug)]
pub struct RedstoneTicker {
    tick_rate: u64,
}

impl RedstoneTicker {
    pub const MAX_SIGNAL: u8 = 15;

    pub fn new(tick_rate: u64) -> Self {
        Self {
            tick_rate: tick_rate.max(1),
        }
    }
}

impl GraphTicker for RedstoneTicker {
    fn tick_rate(&self) -> u64 {
        self.tick_rate
    }

    fn tick_graph(&self, network: &mut NetworkView<'_>, host: &mut dyn CapabilityResolver) {
        let mut active = false;
        for connection in network.extracts() {
            let Some(handle) = host.resolve(
                connection.neighbor(),
                connection.direction.opposite(),
                CapabilityKind::Redstone,
            ) else {
                continue;
            };
            if redstone_mut(host, &handle).is_some_and(|signal| signal.signal() > 0) {
                active = true;
                break;
            }
        }

        let strength = if active { Self::MAX_SIGNAL } else { 0 };
        for connection in network.inserts() {
            let Some(handle) = host.resolve(
                connection.neighbor(),
                connection.direction.opposite(),
                CapabilityKind::Redstone,
            ) else {
                continue;
            };
            if let Some(signal) = redstone_mut(host, &handle) {
                signal.set_signal(strength);
            }
        }

        let members = network.members().to_vec();
        for position in members {
            let current = network
                .data(position)
                .and_then(|data| data.as_any().downcast_ref::<RedstoneConduitData>())
                .map(|data| data.active);
            if current.is_none_or(|current| current == active) {
                continue;
            }
            if let Some(data) = network
                .data_mut(position)
                .and_then(|data| data.as_any_mut().downcast_mut::<RedstoneConduitData>())
            {
                data.active = active;
            }
        }
    }

    fn can_connect_to(
        &self,
        host: &dyn CapabilityResolver,
        position: Position,
        direction: Direction,
    ) -> bool {
        host.resolve(
            position.relative(direction),
            direction.opposite(),
            CapabilityKind::Redstone,
        )
        .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conduits::host::{EnergyCell, HostBlock, InMemoryHost, ItemBuffer};
    use crate::conduits::{CapabilityHandle, Connection};

    fn connection(host: &InMemoryHost, conduit: Position, direction: Direction, kind: CapabilityKind) -> CapabilityConnection {
        let handle: CapabilityHandle = host
            .resolve(conduit.relative(direction), direction.opposite(), kind)
            .expect("capability present");
        CapabilityConnection {
            handle,
            connection: Connection {
                position: conduit,
                direction,
                filter: None,
                upgrade: None,
            },
        }
    }

    #[test]
    fn energy_is_split_evenly_between_sinks() {
        let conduit = Position::new(0, 0, 0);
        let mut host = InMemoryHost::new();
        host.insert(conduit.relative(Direction::West), HostBlock::Energy(EnergyCell::filled(1_000, 1_000)));
        host.insert(conduit.relative(Direction::East), HostBlock::Energy(EnergyCell::new(1_000)));
        host.insert(conduit.relative(Direction::Up), HostBlock::Energy(EnergyCell::new(1_000)));

        let extracts = [connection(&host, conduit, Direction::West, CapabilityKind::Energy)];
        let inserts = [
            connection(&host, conduit, Direction::East, CapabilityKind::Energy),
            connection(&host, conduit, Direction::Up, CapabilityKind::Energy),
        ];

        EnergyTicker::new(20, 5).tick_capability_graph(
            &inserts,
            &extracts,
            &mut RoundRobin::default(),
            &mut host,
        );

        let stored = |dir| host.energy(conduit.relative(dir)).unwrap().stored();
        assert_eq!(stored(Direction::West), 900);
        assert_eq!(stored(Direction::East), 50);
        assert_eq!(stored(Direction::Up), 50);
    }

    fn energy_network(host: &mut InMemoryHost, conduit: Position) -> (Vec<CapabilityConnection>, Vec<CapabilityConnection>) {
        host.insert(conduit.relative(Direction::West), HostBlock::Energy(EnergyCell::filled(1_000, 1_000)));
        let sinks = [Direction::East, Direction::Up, Direction::North];
        for direction in sinks {
            host.insert(conduit.relative(direction), HostBlock::Energy(EnergyCell::new(1_000)));
        }
        let host = &*host;
        let extracts = vec![connection(host, conduit, Direction::West, CapabilityKind::Energy)];
        let inserts = sinks
            .into_iter()
            .map(|direction| connection(host, conduit, direction, CapabilityKind::Energy))
            .collect();
        (inserts, extracts)
    }

    #[test]
    fn each_network_keeps_its_own_round_robin() {
        let first = Position::new(0, 0, 0);
        let second = Position::new(10, 0, 0);
        let mut host = InMemoryHost::new();
        let (first_inserts, first_extracts) = energy_network(&mut host, first);
        let (second_inserts, second_extracts) = energy_network(&mut host, second);
        let ticker = EnergyTicker::new(10, 1);
        let mut first_cursor = RoundRobin::default();
        let mut second_cursor = RoundRobin::default();

        ticker.tick_capability_graph(&first_inserts, &first_extracts, &mut first_cursor, &mut host);
        ticker.tick_capability_graph(&second_inserts, &second_extracts, &mut second_cursor, &mut host);
        let stored = |host: &InMemoryHost, at: Position| {
            [Direction::East, Direction::Up, Direction::North]
                .map(|direction| host.energy(at.relative(direction)).unwrap().stored())
        };
        assert_eq!(stored(&host, first), [4, 3, 3]);
        assert_eq!(stored(&host, second), [4, 3, 3]);
        assert_eq!(first_cursor.insert, 1);

        ticker.tick_capability_graph(&first_inserts, &first_extracts, &mut first_cursor, &mut host);
        assert_eq!(stored(&host, first), [7, 7, 6]);
        assert_eq!(stored(&host, second), [4, 3, 3]);
    }

    #[test]
    fn energy_transfer_is_bounded_by_sink_room() {
        let conduit = Position::new(0, 0, 0);
        let mut host = InMemoryHost::new();
        host.insert(conduit.relative(Direction::West), HostBlock::Energy(EnergyCell::filled(500, 500)));
        host.insert(conduit.relative(Direction::East), HostBlock::Energy(EnergyCell::new(30)));

        let extracts = [connection(&host, conduit, Direction::West, CapabilityKind::Energy)];
        let inserts = [connection(&host, conduit, Direction::East, CapabilityKind::Energy)];
        EnergyTicker::new(1_000, 1).tick_capability_graph(
            &inserts,
            &extracts,
            &mut RoundRobin::default(),
            &mut host,
        );

        assert_eq!(host.energy(conduit.relative(Direction::West)).unwrap().stored(), 470);
        assert_eq!(host.energy(conduit.relative(Direction::East)).unwrap().stored(), 30);
    }

    #[test]
    fn items_move_in_batches_and_respect_insert_filter() {
        let conduit = Position::new(0, 0, 0);
        let mut host = InMemoryHost::new();
        let mut chest = ItemBuffer::new(64, None);
        assert!(chest.accept_stack(Stack::new(3, 10)));
        host.insert(conduit.relative(Direction::West), HostBlock::Items(chest));
        host.insert(conduit.relative(Direction::North), HostBlock::Items(ItemBuffer::new(64, None)));
        host.insert(conduit.relative(Direction::East), HostBlock::Items(ItemBuffer::new(64, None)));

        let extracts = [connection(&host, conduit, Direction::West, CapabilityKind::Items)];
        let mut filtered = connection(&host, conduit, Direction::North, CapabilityKind::Items);
        filtered.connection.filter = Some(Stack::new(8, 1));
        let inserts = [
            filtered,
            connection(&host, conduit, Direction::East, CapabilityKind::Items),
        ];

        let ticker = ItemTicker::new(4, 5);
        ticker.tick_capability_graph(&inserts, &extracts, &mut RoundRobin::default(), &mut host);

        let count = |dir| host.items(conduit.relative(dir)).unwrap().buffered_item_count();
        assert_eq!(count(Direction::West), 6);
        assert_eq!(count(Direction::North), 0);
        assert_eq!(count(Direction::East), 4);
    }

    #[test]
    fn upgrades_multiply_item_batch() {
        let ticker = ItemTicker::new(4, 5);
        assert_eq!(ticker.batch_size(None), 4);
        assert_eq!(ticker.batch_size(Some(&Stack::new(1, 3))), 12);
        assert_eq!(ItemTicker::new(u16::MAX, 1).batch_size(Some(&Stack::new(1, 2))), u16::MAX);
    }
}
