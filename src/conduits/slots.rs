//! Item-slot view over the filter and upgrade items of a bundle's dynamic links.

use crate::conduits::{ConduitBundle, ConduitTypeRegistry, ConnectionState, SlotType, Stack};
use crate::conduits::bundle::MAX_CONDUIT_TYPES;
use crate::error::{ConduitError, Result};
use crate::types::Direction;

/// Number of addressable slots: three roles, for each of nine type indices, on each face.
pub const SLOT_COUNT: usize = SlotType::ALL.len() * MAX_CONDUIT_TYPES * Direction::ALL.len();

/// Decoded slot address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotData {
    pub direction: Direction,
    pub type_index: usize,
    pub slot_type: SlotType,
}

impl SlotData {
    pub fn of(slot: usize) -> Option<SlotData> {
        if slot >= SLOT_COUNT {
            return None;
        }
        let slot_type = SlotType::from_index(slot % SlotType::ALL.len())?;
        let rest = slot / SlotType::ALL.len();
        Some(SlotData {
            direction: Direction::from_index(rest / MAX_CONDUIT_TYPES)?,
            type_index: rest % MAX_CONDUIT_TYPES,
            slot_type,
        })
    }

    pub fn to_index(self) -> usize {
        (self.direction.index() * MAX_CONDUIT_TYPES + self.type_index) * SlotType::ALL.len()
            + self.slot_type.index()
    }
}

/// Borrowed slot view of one bundle. A slot is only usable when the type at its index shows
/// that role on its screen and the link on that face is dynamic; other slots read as empty and
/// refuse items.
pub struct ConduitItemSlots<'a> {
    registry: &'a ConduitTypeRegistry,
    bundle: &'a mut ConduitBundle,
}

impl<'a> ConduitItemSlots<'a> {
    pub fn new(registry: &'a ConduitTypeRegistry, bundle: &'a mut ConduitBundle) -> Self {
        Self { registry, bundle }
    }

    pub fn slots(&self) -> usize {
        SLOT_COUNT
    }

    pub fn slot_limit(&self, slot: usize) -> u16 {
        SlotData::of(slot).map_or(0, |data| data.slot_type.stack_limit())
    }

    fn active(&self, slot: usize) -> Option<SlotData> {
        let data = SlotData::of(slot)?;
        let conduit_type = *self.bundle.types().get(data.type_index)?;
        let screen = self.registry[conduit_type].screen();
        let shown = match data.slot_type {
            SlotType::FilterExtract => screen.has_filter_extract,
            SlotType::FilterInsert => screen.has_filter_insert,
            SlotType::UpgradeExtract => screen.has_upgrade,
        };
        let dynamic = matches!(
            self.bundle
                .connection(data.direction)
                .state(data.type_index),
            Some(ConnectionState::Dynamic(_))
        );
        (shown && dynamic).then_some(data)
    }

    pub fn is_slot_active(&self, slot: usize) -> bool {
        self.active(slot).is_some()
    }

    pub fn stack_in_slot(&self, slot: usize) -> Option<&Stack> {
        let data = self.active(slot)?;
        self.bundle
            .item(data.slot_type, data.direction, data.type_index)
    }

    /// Replaces the slot content, clamped to the slot limit. Returns whether the slot took it.
    pub fn set_stack_in_slot(&mut self, slot: usize, stack: Option<Stack>) -> Result<bool> {
        if slot >= SLOT_COUNT {
            return Err(ConduitError::InvalidSlot(slot));
        }
        let Some(data) = self.active(slot) else {
            return Ok(false);
        };
        let limit = data.slot_type.stack_limit();
        let stack = stack.map(|stack| {
            let count = stack.item_count.min(limit);
            stack.with_count(count)
        });
        Ok(self
            .bundle
            .set_item(data.slot_type, data.direction, data.type_index, stack))
    }

    /// Adds to the slot and returns what did not fit.
    pub fn insert_item(&mut self, slot: usize, stack: Stack, simulate: bool) -> Option<Stack> {
        if stack.is_empty() {
            return None;
        }
        let Some(data) = self.active(slot) else {
            return Some(stack);
        };

        let limit = data.slot_type.stack_limit();
        let current = self
            .bundle
            .item(data.slot_type, data.direction, data.type_index)
            .cloned();
        let held = match &current {
            Some(existing) if !existing.can_stack_with(&stack) => return Some(stack),
            Some(existing) => existing.item_count,
            None => 0,
        };
        let accepted = stack.item_count.min(limit.saturating_sub(held));
        if accepted == 0 {
            return Some(stack);
        }

        if !simulate {
            self.bundle.set_item(
                data.slot_type,
                data.direction,
                data.type_index,
                Some(stack.with_count(held + accepted)),
            );
        }
        let rest = stack.item_count - accepted;
        (rest > 0).then(|| stack.with_count(rest))
    }

    /// Takes up to `amount` items out of the slot.
    pub fn extract_item(&mut self, slot: usize, amount: u16, simulate: bool) -> Option<Stack> {
        let data = self.active(slot)?;
        let mut current = self
            .bundle
            .item(data.slot_type, data.direction, data.type_index)
            .cloned()?;
        let taken = current.split(amount)?;
        if !simulate {
            let rest = (!current.is_empty()).then_some(current);
            self.bundle
                .set_item(data.slot_type, data.direction, data.type_index, rest);
        }
        Some(taken)
    }
}
