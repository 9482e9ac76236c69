use serde::{Deserialize, Serialize};

use crate::types::ItemType;

/// A stack of homogeneous items: the content of a filter or upgrade slot, or the unit an item
/// network moves between endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stack {
    /// Item identifier representing the type in this stack.
    pub item_type: ItemType,
    /// How many items are contained in this stack.
    pub item_count: u16,
}

impl Stack {
    /// Creates a new stack for the given item type with the provided quantity.
    pub fn new(item_type: ItemType, item_count: u16) -> Self {
        Self {
            item_type,
            item_count,
        }
    }

    /// Returns `true` if the stack holds no items.
    pub fn is_empty(&self) -> bool {
        self.item_count == 0
    }

    /// Returns `true` if `other` holds the same kind of item, regardless of count.
    pub fn can_stack_with(&self, other: &Stack) -> bool {
        self.item_type == other.item_type
    }

    /// Splits up to `count` items off this stack into a new stack, shrinking the original in
    /// place. Taking everything leaves `self` empty. Returns `None` when `count` is zero or the
    /// stack is already empty.
    pub fn split(&mut self, count: u16) -> Option<Stack> {
        let taken = count.min(self.item_count);
        if taken == 0 {
            return None;
        }

        self.item_count -= taken;
        Some(Stack {
            item_type: self.item_type,
            item_count: taken,
        })
    }

    /// Returns a copy of this stack resized to `count` items.
    pub fn with_count(&self, count: u16) -> Stack {
        Stack {
            item_type: self.item_type,
            item_count: count,
        }
    }
}
