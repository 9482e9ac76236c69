//! Conduit networks for a voxel factory game: segments of one resource kind join into
//! networks that periodically move energy, items or signals between the blocks they touch.

pub mod conduits;
pub mod config;
pub mod error;
pub mod types;

pub use config::ConduitConfig;
pub use error::{ConduitError, Result};
pub use types::{Direction, ItemType, Position};
