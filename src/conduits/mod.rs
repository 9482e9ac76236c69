//! Conduit networks: per-position bundles, the graphs joining them and the tick engine moving
//! resources between their endpoints.

pub mod bundle;
pub mod capability;
pub mod conduit_type;
pub mod connection;
pub mod data;
pub mod distribution;
pub mod dormant;
pub mod endpoint;
pub mod graph;
pub mod host;
pub mod node;
pub mod slots;
pub mod stack;
pub mod ticker;
pub mod tickers;
pub mod world;

#[cfg(test)]
mod tests;

// Re-export the main types for easier access
pub use bundle::{AddOutcome, BundleRecord, ConduitBundle, Facade, MAX_CONDUIT_TYPES, NodeRecord};
pub use capability::{
    CapabilityHandle, CapabilityKind, CapabilityRef, CapabilityResolver, EnergyStorage,
    ItemHandler, RedstoneSignal,
};
pub use conduit_type::{
    ConduitScreenData, ConduitType, ConduitTypeBuilder, ConduitTypeId, ConduitTypeRegistry, Tier,
};
pub use connection::{ConduitConnection, ConnectionState, DynamicConnectionState, SlotType};
pub use data::{Actor, EmptyConduitData, ExtendedConduitData, RedstoneConduitData};
pub use distribution::RoundRobin;
pub use dormant::DormantStore;
pub use endpoint::ConduitEndpoint;
pub use graph::{Graph, GraphArena, GraphId, NodeStore};
pub use node::{NodeIdentifier, NodeKey};
pub use slots::{ConduitItemSlots, SLOT_COUNT, SlotData};
pub use stack::Stack;
pub use ticker::{
    CapabilityConnection, CapabilityTicker, ConduitTicker, Connection, GraphTicker, NetworkView,
};
pub use tickers::{EnergyTicker, ItemTicker, RedstoneTicker};
pub use world::{ConduitWorld, RemoveOutcome};
