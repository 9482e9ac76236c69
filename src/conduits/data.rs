use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::fmt::Debug;

use crate::conduits::ConduitType;
use crate::error::Result;
use crate::types::Position;

/// Whoever placed a conduit, when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub name: String,
}

impl Actor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Type-specific payload carried by every node of a conduit type.
///
/// The core never looks inside; it only drives the lifecycle hooks, copies the payload into the
/// presentation bundle and persists it when [`sync_to_client`](Self::sync_to_client) asks for it.
pub trait ExtendedConduitData: Debug + Any {
    /// Called when the node is bound to a live position (placement or reload).
    fn on_created(&mut self, _conduit_type: &ConduitType, _position: Position, _actor: Option<&Actor>) {
    }

    /// Called when the node releases its live position (removal, upgrade or unload).
    fn on_removed(&mut self, _conduit_type: &ConduitType, _position: Position) {}

    fn to_value(&self) -> Value {
        Value::Null
    }

    fn load_value(&mut self, _value: &Value) -> Result<()> {
        Ok(())
    }

    fn deep_copy(&self) -> Box<dyn ExtendedConduitData>;

    /// Whether observers of the presentation copy need this payload.
    fn sync_to_client(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Payload for conduit types that carry no state of their own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmptyConduitData;

impl ExtendedConduitData for EmptyConduitData {
    fn deep_copy(&self) -> Box<dyn ExtendedConduitData> {
        Box::new(*self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Whether the redstone network this node belongs to currently carries a signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedstoneConduitData {
    pub active: bool,
}

impl ExtendedConduitData for RedstoneConduitData {
    fn to_value(&self) -> Value {
        serde_json::json!({ "active": self.active })
    }

    fn load_value(&mut self, value: &Value) -> Result<()> {
        *self = serde_json::from_value(value.clone())?;
        Ok(())
    }

    fn deep_copy(&self) -> Box<dyn ExtendedConduitData> {
        Box::new(*self)
    }

    fn sync_to_client(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redstone_data_round_trips_through_value() {
        let data = RedstoneConduitData { active: true };
        let mut restored = RedstoneConduitData::default();
        restored.load_value(&data.to_value()).expect("valid payload");
        assert_eq!(restored, data);
    }

    #[test]
    fn redstone_data_rejects_malformed_payload() {
        let mut data = RedstoneConduitData::default();
        assert!(data.load_value(&serde_json::json!({ "active": 3 })).is_err());
    }

    #[test]
    fn deep_copy_preserves_concrete_type() {
        let data = RedstoneConduitData { active: true };
        let copy = data.deep_copy();
        let copy = copy
            .as_any()
            .downcast_ref::<RedstoneConduitData>()
            .expect("same payload type");
        assert!(copy.active);
    }
}
