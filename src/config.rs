//! Runtime configuration for conduit networks.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables shared by the built-in conduit types and the world orchestration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConduitConfig {
    /// Treat caller mistakes (e.g. removing an absent type) as errors instead of no-ops.
    #[serde(default = "default_strict")]
    pub strict: bool,

    /// How often the built-in tickers run, in simulation steps. 1 is every step.
    #[serde(default = "default_tick_rate")]
    pub tick_rate: u64,

    /// Energy a tier-1 power network moves per extract endpoint per step; scaled by tier.
    #[serde(default = "default_energy_transfer_rate")]
    pub energy_transfer_rate: u64,

    /// Items an item network pulls from one extract endpoint per pass, before upgrades.
    #[serde(default = "default_item_stack_size")]
    pub item_stack_size: u16,
}

const fn default_strict() -> bool {
    cfg!(debug_assertions)
}

const fn default_tick_rate() -> u64 {
    5
}

const fn default_energy_transfer_rate() -> u64 {
    1000
}

const fn default_item_stack_size() -> u16 {
    4
}

impl Default for ConduitConfig {
    fn default() -> Self {
        Self {
            strict: default_strict(),
            tick_rate: default_tick_rate(),
            energy_transfer_rate: default_energy_transfer_rate(),
            item_stack_size: default_item_stack_size(),
        }
    }
}

impl ConduitConfig {
    /// Parses a TOML document; missing keys fall back to their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: ConduitConfig = toml::from_str(source)?;
        Ok(config)
    }

    /// Tick rate clamped to at least one step.
    #[must_use]
    pub fn effective_tick_rate(&self) -> u64 {
        self.tick_rate.max(1)
    }
}
