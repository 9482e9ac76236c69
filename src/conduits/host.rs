//! A self-contained host world: plain blocks exposing one capability each, kept in memory.
//!
//! Drives the demo and the scenario tests; a real embedding implements
//! [`CapabilityResolver`] over its own block storage instead.

use std::collections::HashMap;

use crate::conduits::{
    CapabilityHandle, CapabilityKind, CapabilityRef, CapabilityResolver, EnergyStorage,
    ItemHandler, RedstoneSignal, Stack,
};
use crate::types::{Direction, ItemType, Position};

/// An energy buffer with per-operation rate limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnergyCell {
    stored: u64,
    capacity: u64,
    max_receive: u64,
    max_extract: u64,
}

impl EnergyCell {
    /// An empty cell without rate limits.
    pub fn new(capacity: u64) -> Self {
        Self::filled(capacity, 0)
    }

    pub fn filled(capacity: u64, stored: u64) -> Self {
        Self {
            stored: stored.min(capacity),
            capacity,
            max_receive: u64::MAX,
            max_extract: u64::MAX,
        }
    }

    pub fn with_limits(mut self, max_receive: u64, max_extract: u64) -> Self {
        self.max_receive = max_receive;
        self.max_extract = max_extract;
        self
    }

    pub fn stored(&self) -> u64 {
        self.stored
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}

impl EnergyStorage for EnergyCell {
    fn receive_energy(&mut self, max: u64, simulate: bool) -> u64 {
        let accepted = max
            .min(self.max_receive)
            .min(self.capacity - self.stored);
        if !simulate {
            self.stored += accepted;
        }
        accepted
    }

    fn extract_energy(&mut self, max: u64, simulate: bool) -> u64 {
        let given = max.min(self.max_extract).min(self.stored);
        if !simulate {
            self.stored -= given;
        }
        given
    }

    fn energy_stored(&self) -> u64 {
        self.stored
    }
}

/// A single-slot item buffer.
///
/// Holds at most one stack, aggregating matching items into it up to `item_limit`. An optional
/// filter restricts which item types are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemBuffer {
    item_limit: u16,
    item_filter: Option<Vec<ItemType>>,
    buffer: Option<Stack>,
}

impl ItemBuffer {
    pub fn new(item_limit: u16, item_filter: Option<Vec<ItemType>>) -> Self {
        Self {
            item_limit,
            item_filter,
            buffer: None,
        }
    }

    pub fn item_limit(&self) -> u16 {
        self.item_limit
    }

    pub fn item_filter(&self) -> Option<&[ItemType]> {
        self.item_filter.as_deref()
    }

    pub fn set_item_filter(&mut self, filter: Option<Vec<ItemType>>) {
        self.item_filter = filter;
    }

    /// Returns the number of items currently buffered.
    pub fn buffered_item_count(&self) -> u16 {
        self.buffer
            .as_ref()
            .map(|stack| stack.item_count)
            .unwrap_or(0)
    }

    pub fn contents(&self) -> Option<&Stack> {
        self.buffer.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_none()
    }

    /// How many items of `stack`'s type still fit.
    pub fn room_for(&self, stack: &Stack) -> u16 {
        if let Some(filter) = &self.item_filter {
            if !filter.contains(&stack.item_type) {
                return 0;
            }
        }

        match &self.buffer {
            None => self.item_limit,
            Some(existing) if existing.can_stack_with(stack) => {
                self.item_limit.saturating_sub(existing.item_count)
            }
            Some(_) => 0,
        }
    }

    /// Returns `true` if the whole stack can be accepted.
    pub fn can_accept_stack(&self, stack: &Stack) -> bool {
        stack.is_empty() || stack.item_count <= self.room_for(stack)
    }

    /// Attempts to accept the whole stack, returning `true` if it was consumed.
    pub fn accept_stack(&mut self, stack: Stack) -> bool {
        if !self.can_accept_stack(&stack) {
            return false;
        }
        if !stack.is_empty() {
            self.add(stack);
        }
        true
    }

    fn add(&mut self, stack: Stack) {
        match self.buffer.as_mut() {
            Some(existing) => existing.item_count += stack.item_count,
            None => self.buffer = Some(stack),
        }
    }

    /// Removes and returns up to `max` buffered items.
    pub fn take(&mut self, max: u16) -> Option<Stack> {
        let buffer = self.buffer.as_mut()?;
        let taken = buffer.split(max)?;
        if buffer.is_empty() {
            self.buffer = None;
        }
        Some(taken)
    }
}

impl ItemHandler for ItemBuffer {
    fn insert_stack(&mut self, stack: Stack, simulate: bool) -> Option<Stack> {
        let accepted = stack.item_count.min(self.room_for(&stack));
        if accepted > 0 && !simulate {
            self.add(stack.with_count(accepted));
        }
        let rest = stack.item_count - accepted;
        (rest > 0).then(|| stack.with_count(rest))
    }

    fn extract_stack(&mut self, max: u16, filter: Option<&Stack>, simulate: bool) -> Option<Stack> {
        let buffer = self.buffer.as_ref()?;
        if filter.is_some_and(|filter| !filter.can_stack_with(buffer)) {
            return None;
        }
        if simulate {
            let count = max.min(buffer.item_count);
            return (count > 0).then(|| buffer.with_count(count));
        }
        self.take(max)
    }
}

/// A block that emits a redstone signal and remembers the last signal it was given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalPort {
    emitted: u8,
    received: u8,
}

impl SignalPort {
    pub fn emitter(strength: u8) -> Self {
        Self {
            emitted: strength,
            received: 0,
        }
    }

    pub fn receiver() -> Self {
        Self::default()
    }

    pub fn set_emitted(&mut self, strength: u8) {
        self.emitted = strength;
    }

    pub fn received(&self) -> u8 {
        self.received
    }
}

impl RedstoneSignal for SignalPort {
    fn signal(&self) -> u8 {
        self.emitted
    }

    fn set_signal(&mut self, strength: u8) {
        self.received = strength;
    }
}

/// A plain block of the host world. Each exposes its capability on every face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostBlock {
    Energy(EnergyCell),
    Items(ItemBuffer),
    Signal(SignalPort),
}

impl HostBlock {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            HostBlock::Energy(_) => CapabilityKind::Energy,
            HostBlock::Items(_) => CapabilityKind::Items,
            HostBlock::Signal(_) => CapabilityKind::Redstone,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryHost {
    blocks: HashMap<Position, HostBlock>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, position: Position, block: HostBlock) -> Option<HostBlock> {
        self.blocks.insert(position, block)
    }

    pub fn remove(&mut self, position: Position) -> Option<HostBlock> {
        self.blocks.remove(&position)
    }

    pub fn get(&self, position: Position) -> Option<&HostBlock> {
        self.blocks.get(&position)
    }

    pub fn energy(&self, position: Position) -> Option<&EnergyCell> {
        match self.blocks.get(&position)? {
            HostBlock::Energy(cell) => Some(cell),
            _ => None,
        }
    }

    pub fn items(&self, position: Position) -> Option<&ItemBuffer> {
        match self.blocks.get(&position)? {
            HostBlock::Items(buffer) => Some(buffer),
            _ => None,
        }
    }

    pub fn signal(&self, position: Position) -> Option<&SignalPort> {
        match self.blocks.get(&position)? {
            HostBlock::Signal(port) => Some(port),
            _ => None,
        }
    }

    pub fn signal_mut(&mut self, position: Position) -> Option<&mut SignalPort> {
        match self.blocks.get_mut(&position)? {
            HostBlock::Signal(port) => Some(port),
            _ => None,
        }
    }
}

impl CapabilityResolver for InMemoryHost {
    fn resolve(
        &self,
        position: Position,
        side: Direction,
        kind: CapabilityKind,
    ) -> Option<CapabilityHandle> {
        let block = self.blocks.get(&position)?;
        (block.kind() == kind).then_some(CapabilityHandle {
            position,
            side,
            kind,
        })
    }

    fn capability_mut(&mut self, handle: &CapabilityHandle) -> Option<CapabilityRef<'_>> {
        let capability = match self.blocks.get_mut(&handle.position)? {
            HostBlock::Energy(cell) => CapabilityRef::Energy(cell),
            HostBlock::Items(buffer) => CapabilityRef::Items(buffer),
            HostBlock::Signal(port) => CapabilityRef::Redstone(port),
        };
        Some(capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_stack_respects_limit_and_type() {
        let mut buffer = ItemBuffer::new(10, None);
        assert!(buffer.accept_stack(Stack::new(1, 6)));
        assert!(buffer.accept_stack(Stack::new(1, 4)));
        assert_eq!(buffer.buffered_item_count(), 10);

        // Further stacks would exceed the limit.
        assert!(!buffer.accept_stack(Stack::new(1, 1)));
        // Different item types are rejected.
        assert!(!buffer.accept_stack(Stack::new(2, 1)));
    }

    #[test]
    fn item_filter_blocks_disallowed_items() {
        let mut buffer = ItemBuffer::new(5, Some(vec![1]));
        assert_eq!(buffer.insert_stack(Stack::new(2, 3), false), Some(Stack::new(2, 3)));
        assert_eq!(buffer.insert_stack(Stack::new(1, 7), false), Some(Stack::new(1, 2)));
        assert_eq!(buffer.buffered_item_count(), 5);
    }

    #[test]
    fn simulated_operations_leave_buffer_untouched() {
        let mut buffer = ItemBuffer::new(8, None);
        assert_eq!(buffer.insert_stack(Stack::new(4, 3), true), None);
        assert!(buffer.is_empty());

        buffer.accept_stack(Stack::new(4, 3));
        assert_eq!(buffer.extract_stack(2, None, true), Some(Stack::new(4, 2)));
        assert_eq!(buffer.buffered_item_count(), 3);
        assert_eq!(buffer.extract_stack(2, Some(&Stack::new(5, 1)), false), None);
        assert_eq!(buffer.extract_stack(9, Some(&Stack::new(4, 1)), false), Some(Stack::new(4, 3)));
        assert!(buffer.is_empty());
    }

    #[test]
    fn energy_cell_honours_rate_limits() {
        let mut cell = EnergyCell::filled(100, 40).with_limits(10, 25);
        assert_eq!(cell.receive_energy(50, false), 10);
        assert_eq!(cell.extract_energy(100, true), 25);
        assert_eq!(cell.stored(), 50);
        assert_eq!(cell.extract_energy(100, false), 25);
        assert_eq!(cell.energy_stored(), 25);
    }

    #[test]
    fn resolve_matches_block_capability() {
        let mut host = InMemoryHost::new();
        let at = Position::new(1, 0, 0);
        host.insert(at, HostBlock::Signal(SignalPort::emitter(7)));

        assert!(host.resolve(at, Direction::West, CapabilityKind::Energy).is_none());
        let handle = host
            .resolve(at, Direction::West, CapabilityKind::Redstone)
            .expect("signal port");
        let signal = host
            .capability_mut(&handle)
            .and_then(CapabilityRef::into_redstone)
            .unwrap();
        assert_eq!(signal.signal(), 7);
        signal.set_signal(15);
        assert_eq!(host.signal(at).unwrap().received(), 15);
    }
}
