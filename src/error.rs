//! Error types for conduit operations.

use thiserror::Error;

use crate::types::Position;

/// Errors raised by conduit bundle and world operations.
///
/// Graph operations never fail and capability misses are not errors; this enum only covers
/// caller mistakes and I/O-shaped failures.
#[derive(Error, Debug)]
pub enum ConduitError {
    /// A type was removed from a bundle that does not hold it (strict mode only).
    #[error("conduit {conduit_type} is not present in conduit bundle {present:?}")]
    TypeNotPresent {
        conduit_type: String,
        present: Vec<String>,
    },

    #[error("unknown conduit type: {0}")]
    UnknownType(String),

    #[error("conduit type {0} is already registered")]
    DuplicateType(String),

    #[error("no conduit bundle loaded at {0}")]
    NoEndpoint(Position),

    #[error("slot {0} is out of range")]
    InvalidSlot(usize),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, ConduitError>;
