//! The boundary between conduit networks and the blocks they serve.

use crate::conduits::Stack;
use crate::types::{Direction, Position};

/// What a conduit type moves, and therefore which capability it looks for on a neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    Energy,
    Items,
    Redstone,
}

/// A resolved capability: the block at `position`, seen from `side`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapabilityHandle {
    pub position: Position,
    pub side: Direction,
    pub kind: CapabilityKind,
}

pub trait EnergyStorage {
    /// Accepts up to `max` energy and returns how much was (or would be) taken.
    fn receive_energy(&mut self, max: u64, simulate: bool) -> u64;

    /// Hands out up to `max` energy and returns how much was (or would be) given.
    fn extract_energy(&mut self, max: u64, simulate: bool) -> u64;

    fn energy_stored(&self) -> u64;
}

pub trait ItemHandler {
    /// Offers `stack` and returns whatever could not be accepted.
    fn insert_stack(&mut self, stack: Stack, simulate: bool) -> Option<Stack>;

    /// Takes up to `max` items, restricted to the filter's item type when one is given.
    fn extract_stack(&mut self, max: u16, filter: Option<&Stack>, simulate: bool) -> Option<Stack>;
}

pub trait RedstoneSignal {
    /// Strength this block emits, 0..=15.
    fn signal(&self) -> u8;

    fn set_signal(&mut self, strength: u8);
}

/// Mutable access to a resolved capability.
pub enum CapabilityRef<'a> {
    Energy(&'a mut dyn EnergyStorage),
    Items(&'a mut dyn ItemHandler),
    Redstone(&'a mut dyn RedstoneSignal),
}

impl<'a> CapabilityRef<'a> {
    pub fn into_energy(self) -> Option<&'a mut dyn EnergyStorage> {
        match self {
            CapabilityRef::Energy(storage) => Some(storage),
            CapabilityRef::Items(_) | CapabilityRef::Redstone(_) => None,
        }
    }

    pub fn into_items(self) -> Option<&'a mut dyn ItemHandler> {
        match self {
            CapabilityRef::Items(handler) => Some(handler),
            CapabilityRef::Energy(_) | CapabilityRef::Redstone(_) => None,
        }
    }

    pub fn into_redstone(self) -> Option<&'a mut dyn RedstoneSignal> {
        match self {
            CapabilityRef::Redstone(signal) => Some(signal),
            CapabilityRef::Energy(_) | CapabilityRef::Items(_) => None,
        }
    }
}

/// Capability lookup exposed by the host world.
///
/// [`resolve`](Self::resolve) is a pure query and is what connectivity probing uses; only
/// transfer routines go through [`capability_mut`](Self::capability_mut).
pub trait CapabilityResolver {
    fn resolve(
        &self,
        position: Position,
        side: Direction,
        kind: CapabilityKind,
    ) -> Option<CapabilityHandle>;

    fn capability_mut(&mut self, handle: &CapabilityHandle) -> Option<CapabilityRef<'_>>;
}

pub(crate) fn energy_mut<'a>(
    host: &'a mut dyn CapabilityResolver,
    handle: &CapabilityHandle,
) -> Option<&'a mut dyn EnergyStorage> {
    host.capability_mut(handle).and_then(CapabilityRef::into_energy)
}

pub(crate) fn items_mut<'a>(
    host: &'a mut dyn CapabilityResolver,
    handle: &CapabilityHandle,
) -> Option<&'a mut dyn ItemHandler> {
    host.capability_mut(handle).and_then(CapabilityRef::into_items)
}

pub(crate) fn redstone_mut<'a>(
    host: &'a mut dyn CapabilityResolver,
    handle: &CapabilityHandle,
) -> Option<&'a mut dyn RedstoneSignal> {
    host.capability_mut(handle).and_then(CapabilityRef::into_redstone)
}
