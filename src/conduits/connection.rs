use serde::{Deserialize, Serialize};

use crate::conduits::Stack;

/// Configuration slots of a [`DynamicConnectionState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotType {
    FilterExtract,
    FilterInsert,
    UpgradeExtract,
}

impl SlotType {
    pub const ALL: [SlotType; 3] = [
        SlotType::FilterExtract,
        SlotType::FilterInsert,
        SlotType::UpgradeExtract,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<SlotType> {
        SlotType::ALL.get(index).copied()
    }

    /// How many items the slot holds: filters take a single ghost item, upgrades stack.
    pub fn stack_limit(self) -> u16 {
        match self {
            SlotType::FilterExtract | SlotType::FilterInsert => 1,
            SlotType::UpgradeExtract => 64,
        }
    }
}

/// A configurable link towards a neighbouring conduit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicConnectionState {
    #[serde(default)]
    pub is_insert: bool,
    #[serde(default)]
    pub is_extract: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_insert: Option<Stack>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_extract: Option<Stack>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_extract: Option<Stack>,
}

impl DynamicConnectionState {
    pub fn item(&self, slot: SlotType) -> Option<&Stack> {
        match slot {
            SlotType::FilterExtract => self.filter_extract.as_ref(),
            SlotType::FilterInsert => self.filter_insert.as_ref(),
            SlotType::UpgradeExtract => self.upgrade_extract.as_ref(),
        }
    }

    /// Stores `stack` in the slot; empty stacks clear it.
    pub fn set_item(&mut self, slot: SlotType, stack: Option<Stack>) {
        let stack = stack.filter(|stack| !stack.is_empty());
        match slot {
            SlotType::FilterExtract => self.filter_extract = stack,
            SlotType::FilterInsert => self.filter_insert = stack,
            SlotType::UpgradeExtract => self.upgrade_extract = stack,
        }
    }

    /// Every item held in the configuration slots.
    pub fn items(&self) -> impl Iterator<Item = &Stack> {
        SlotType::ALL.into_iter().filter_map(|slot| self.item(slot))
    }
}

/// Link state of one conduit type across one face.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disabled,
    /// Fixed link to a plain capability provider; always inserts and extracts.
    Enabled,
    Dynamic(DynamicConnectionState),
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        !matches!(self, ConnectionState::Disabled)
    }

    pub fn is_insert(&self) -> bool {
        match self {
            ConnectionState::Disabled => false,
            ConnectionState::Enabled => true,
            ConnectionState::Dynamic(state) => state.is_insert,
        }
    }

    pub fn is_extract(&self) -> bool {
        match self {
            ConnectionState::Disabled => false,
            ConnectionState::Enabled => true,
            ConnectionState::Dynamic(state) => state.is_extract,
        }
    }

    pub fn as_dynamic(&self) -> Option<&DynamicConnectionState> {
        match self {
            ConnectionState::Dynamic(state) => Some(state),
            ConnectionState::Disabled | ConnectionState::Enabled => None,
        }
    }

    pub fn as_dynamic_mut(&mut self) -> Option<&mut DynamicConnectionState> {
        match self {
            ConnectionState::Dynamic(state) => Some(state),
            ConnectionState::Disabled | ConnectionState::Enabled => None,
        }
    }
}

/**
 * Per-face connection states of a bundle, index-aligned with the bundle's type list. The bundle
 * keeps the six sequences in lockstep: every insertion or removal of a type index is applied to
 * all of them.
 */
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConduitConnection {
    states: Vec<ConnectionState>,
}

impl ConduitConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_states(states: Vec<ConnectionState>) -> Self {
        Self { states }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn states(&self) -> &[ConnectionState] {
        &self.states
    }

    pub fn state(&self, index: usize) -> Option<&ConnectionState> {
        self.states.get(index)
    }

    pub(crate) fn state_mut(&mut self, index: usize) -> Option<&mut ConnectionState> {
        self.states.get_mut(index)
    }

    /// Opens a disabled slot at `index`, shifting higher indices up.
    pub(crate) fn add_type(&mut self, index: usize) {
        debug_assert!(index <= self.states.len());
        self.states.insert(index, ConnectionState::Disabled);
    }

    /// Drops the slot at `index`, shifting higher indices down.
    pub(crate) fn remove_type(&mut self, index: usize) -> Option<ConnectionState> {
        if index >= self.states.len() {
            return None;
        }
        Some(self.states.remove(index))
    }

    /// Resets the slot at `index` to disabled without shifting anything.
    pub(crate) fn clear_type(&mut self, index: usize) {
        if let Some(state) = self.states.get_mut(index) {
            *state = ConnectionState::Disabled;
        }
    }

    /// Links the type at `index`. An end link (plain capability provider) is
    /// [`ConnectionState::Enabled`]; a link to another conduit becomes a default
    /// [`ConnectionState::Dynamic`]. An existing dynamic link keeps its configuration.
    pub(crate) fn connect_to(&mut self, index: usize, end: bool) -> bool {
        let Some(state) = self.states.get_mut(index) else {
            debug_assert!(false, "connection index {index} out of range");
            return false;
        };

        if end {
            *state = ConnectionState::Enabled;
        } else if !matches!(state, ConnectionState::Dynamic(_)) {
            *state = ConnectionState::Dynamic(DynamicConnectionState::default());
        }
        true
    }

    /// Disables the slot at `index`, returning what was there.
    pub(crate) fn disconnect_from(&mut self, index: usize) -> Option<ConnectionState> {
        self.states
            .get_mut(index)
            .map(std::mem::take)
    }

    pub fn item(&self, slot: SlotType, index: usize) -> Option<&Stack> {
        self.state(index)
            .and_then(ConnectionState::as_dynamic)
            .and_then(|state| state.item(slot))
    }

    /// Writes a configuration item; only dynamic links have slots.
    pub(crate) fn set_item(&mut self, slot: SlotType, index: usize, stack: Option<Stack>) -> bool {
        match self.state_mut(index).and_then(ConnectionState::as_dynamic_mut) {
            Some(state) => {
                state.set_item(slot, stack);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dynamic() -> ConnectionState {
        ConnectionState::Dynamic(DynamicConnectionState::default())
    }

    #[test]
    fn end_links_are_enabled_and_conduit_links_dynamic() {
        let mut connection = ConduitConnection::from_states(vec![ConnectionState::Disabled; 2]);
        assert!(connection.connect_to(0, true));
        assert!(connection.connect_to(1, false));

        assert_eq!(connection.state(0), Some(&ConnectionState::Enabled));
        assert_eq!(connection.state(1), Some(&dynamic()));
        let state = connection.state(1).unwrap();
        assert!(!state.is_insert());
        assert!(!state.is_extract());
        assert!(connection.state(0).unwrap().is_insert());
        assert!(connection.state(0).unwrap().is_extract());
    }

    #[test]
    fn reconnecting_keeps_dynamic_configuration() {
        let mut connection = ConduitConnection::from_states(vec![ConnectionState::Disabled]);
        connection.connect_to(0, false);
        connection
            .state_mut(0)
            .and_then(ConnectionState::as_dynamic_mut)
            .unwrap()
            .is_extract = true;

        connection.connect_to(0, false);
        assert!(connection.state(0).unwrap().is_extract());
    }

    #[test]
    fn add_and_remove_shift_indices() {
        let mut connection = ConduitConnection::from_states(vec![
            ConnectionState::Enabled,
            dynamic(),
        ]);
        connection.add_type(1);
        assert_eq!(
            connection.states(),
            &[ConnectionState::Enabled, ConnectionState::Disabled, dynamic()]
        );

        assert_eq!(connection.remove_type(0), Some(ConnectionState::Enabled));
        assert_eq!(connection.states(), &[ConnectionState::Disabled, dynamic()]);
        assert_eq!(connection.remove_type(5), None);
    }

    #[test]
    fn clear_and_disconnect_disable_in_place() {
        let mut connection = ConduitConnection::from_states(vec![dynamic(), ConnectionState::Enabled]);
        connection.clear_type(0);
        assert_eq!(connection.disconnect_from(1), Some(ConnectionState::Enabled));
        assert_eq!(connection.len(), 2);
        assert!(connection.states().iter().all(|state| !state.is_connected()));
    }

    #[test]
    fn items_only_live_in_dynamic_states() {
        let mut connection = ConduitConnection::from_states(vec![dynamic(), ConnectionState::Enabled]);
        assert!(connection.set_item(SlotType::FilterInsert, 0, Some(Stack::new(4, 1))));
        assert!(!connection.set_item(SlotType::FilterInsert, 1, Some(Stack::new(4, 1))));

        assert_eq!(connection.item(SlotType::FilterInsert, 0), Some(&Stack::new(4, 1)));
        assert_eq!(connection.item(SlotType::FilterExtract, 0), None);

        // An empty stack clears the slot.
        connection.set_item(SlotType::FilterInsert, 0, Some(Stack::new(4, 0)));
        assert_eq!(connection.item(SlotType::FilterInsert, 0), None);
    }

    #[test]
    fn states_serialize_with_tag() {
        let mut state = DynamicConnectionState::default();
        state.is_insert = true;
        state.upgrade_extract = Some(Stack::new(9, 2));
        let json = serde_json::to_string(&ConnectionState::Dynamic(state.clone())).unwrap();
        assert_eq!(
            json,
            r#"{"state":"dynamic","is_insert":true,"is_extract":false,"upgrade_extract":{"item_type":9,"item_count":2}}"#
        );

        let parsed: ConnectionState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ConnectionState::Dynamic(state));
        assert_eq!(
            serde_json::to_string(&ConnectionState::Disabled).unwrap(),
            r#"{"state":"disabled"}"#
        );
    }
}
