use std::collections::HashMap;
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use crate::conduits::tickers::{EnergyTicker, ItemTicker, RedstoneTicker};
use crate::conduits::{ConduitTicker, EmptyConduitData, ExtendedConduitData, RedstoneConduitData};
use crate::config::ConduitConfig;
use crate::error::{ConduitError, Result};
use crate::types::Position;

/// Handle of a registered conduit type. Ids are handed out in registration order, which is
/// also the order conduit types take inside a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConduitTypeId(u16);

impl ConduitTypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[cfg(test)]
    pub(crate) const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConduitTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which configuration slots the screen of a conduit type exposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConduitScreenData {
    pub has_filter_insert: bool,
    pub has_filter_extract: bool,
    pub has_upgrade: bool,
}

impl ConduitScreenData {
    pub const NONE: ConduitScreenData = ConduitScreenData {
        has_filter_insert: false,
        has_filter_extract: false,
        has_upgrade: false,
    };

    pub const ALL: ConduitScreenData = ConduitScreenData {
        has_filter_insert: true,
        has_filter_extract: true,
        has_upgrade: true,
    };
}

/// Position of a conduit type within a family of upgradeable tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    pub family: String,
    pub level: u8,
}

pub type DataFactory = Arc<dyn Fn(Position) -> Box<dyn ExtendedConduitData> + Send + Sync>;

/// Immutable descriptor of one kind of conduit.
pub struct ConduitType {
    id: ConduitTypeId,
    key: String,
    tier: Option<Tier>,
    screen: ConduitScreenData,
    ticker: ConduitTicker,
    data_factory: DataFactory,
}

impl fmt::Debug for ConduitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConduitType")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("tier", &self.tier)
            .field("screen", &self.screen)
            .finish_non_exhaustive()
    }
}

impl ConduitType {
    pub fn id(&self) -> ConduitTypeId {
        self.id
    }

    /// Persisted identifier, e.g. `power2`.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn tier(&self) -> Option<&Tier> {
        self.tier.as_ref()
    }

    pub fn screen(&self) -> ConduitScreenData {
        self.screen
    }

    pub fn ticker(&self) -> &ConduitTicker {
        &self.ticker
    }

    /// Builds a fresh payload for a node of this type at `position`.
    pub fn create_data(&self, position: Position) -> Box<dyn ExtendedConduitData> {
        (self.data_factory)(position)
    }

    /// A conduit can be upgraded in place by a strictly higher tier of the same family.
    pub fn can_be_replaced_by(&self, other: &ConduitType) -> bool {
        match (&self.tier, &other.tier) {
            (Some(mine), Some(theirs)) => mine.family == theirs.family && theirs.level > mine.level,
            _ => false,
        }
    }

    /// Two tiers of the same family never share a bundle.
    pub fn can_be_in_same_block(&self, other: &ConduitType) -> bool {
        match (&self.tier, &other.tier) {
            (Some(mine), Some(theirs)) => mine.family != theirs.family,
            _ => true,
        }
    }
}

/// Describes a conduit type before it is registered.
pub struct ConduitTypeBuilder {
    key: String,
    tier: Option<Tier>,
    screen: ConduitScreenData,
    ticker: ConduitTicker,
    data_factory: DataFactory,
}

impl ConduitTypeBuilder {
    pub fn new(key: impl Into<String>, ticker: ConduitTicker) -> Self {
        Self {
            key: key.into(),
            tier: None,
            screen: ConduitScreenData::NONE,
            ticker,
            data_factory: Arc::new(|_| Box::new(EmptyConduitData)),
        }
    }

    pub fn tier(mut self, family: impl Into<String>, level: u8) -> Self {
        self.tier = Some(Tier {
            family: family.into(),
            level,
        });
        self
    }

    pub fn screen(mut self, screen: ConduitScreenData) -> Self {
        self.screen = screen;
        self
    }

    pub fn data<F>(mut self, factory: F) -> Self
    where
        F: Fn(Position) -> Box<dyn ExtendedConduitData> + Send + Sync + 'static,
    {
        self.data_factory = Arc::new(factory);
        self
    }
}

/// Static table of every conduit type known to the process. Built once at start-up and shared
/// read-only afterwards.
#[derive(Debug, Default)]
pub struct ConduitTypeRegistry {
    types: Vec<ConduitType>,
    by_key: HashMap<String, ConduitTypeId>,
}

impl ConduitTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, builder: ConduitTypeBuilder) -> Result<ConduitTypeId> {
        if self.by_key.contains_key(&builder.key) {
            return Err(ConduitError::DuplicateType(builder.key));
        }

        let id = ConduitTypeId(self.types.len() as u16);
        self.by_key.insert(builder.key.clone(), id);
        self.types.push(ConduitType {
            id,
            key: builder.key,
            tier: builder.tier,
            screen: builder.screen,
            ticker: builder.ticker,
            data_factory: builder.data_factory,
        });
        Ok(id)
    }

    pub fn get(&self, id: ConduitTypeId) -> Option<&ConduitType> {
        self.types.get(id.index())
    }

    pub fn by_key(&self, key: &str) -> Option<ConduitTypeId> {
        self.by_key.get(key).copied()
    }

    /// Looks a key up, failing with [`ConduitError::UnknownType`].
    pub fn require(&self, key: &str) -> Result<ConduitTypeId> {
        self.by_key(key)
            .ok_or_else(|| ConduitError::UnknownType(key.to_string()))
    }

    /// Total order used to place types inside a bundle.
    pub fn sort_index(&self, id: ConduitTypeId) -> usize {
        id.index()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConduitType> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// The stock conduit set: three power tiers, redstone and items.
    pub fn ender_defaults(config: &ConduitConfig) -> Result<Self> {
        let mut registry = Self::new();
        let tick_rate = config.effective_tick_rate();
        for level in 1..=3u8 {
            registry.register(
                ConduitTypeBuilder::new(
                    format!("power{level}"),
                    ConduitTicker::Capability(Box::new(EnergyTicker::new(
                        config.energy_transfer_rate * level as u64,
                        tick_rate,
                    ))),
                )
                .tier("power", level),
            )?;
        }
        registry.register(
            ConduitTypeBuilder::new(
                "redstone",
                ConduitTicker::Graph(Box::new(RedstoneTicker::new(tick_rate))),
            )
            .data(|_| Box::new(RedstoneConduitData::default())),
        )?;
        registry.register(
            ConduitTypeBuilder::new(
                "item",
                ConduitTicker::Capability(Box::new(ItemTicker::new(
                    config.item_stack_size,
                    tick_rate,
                ))),
            )
            .screen(ConduitScreenData::ALL),
        )?;
        Ok(registry)
    }
}

impl Index<ConduitTypeId> for ConduitTypeRegistry {
    type Output = ConduitType;

    /// Panics when the id was minted by a different registry.
    fn index(&self, id: ConduitTypeId) -> &ConduitType {
        &self.types[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> ConduitTypeRegistry {
        ConduitTypeRegistry::ender_defaults(&ConduitConfig::default()).expect("unique keys")
    }

    #[test]
    fn higher_power_tier_replaces_lower() {
        let registry = defaults();
        let power1 = &registry[registry.by_key("power1").unwrap()];
        let power2 = &registry[registry.by_key("power2").unwrap()];
        let redstone = &registry[registry.by_key("redstone").unwrap()];

        assert!(power1.can_be_replaced_by(power2));
        assert!(!power2.can_be_replaced_by(power1));
        assert!(!power1.can_be_replaced_by(redstone));
    }

    #[test]
    fn same_family_cannot_share_a_block() {
        let registry = defaults();
        let power1 = &registry[registry.by_key("power1").unwrap()];
        let power3 = &registry[registry.by_key("power3").unwrap()];
        let item = &registry[registry.by_key("item").unwrap()];

        assert!(!power3.can_be_in_same_block(power1));
        assert!(power3.can_be_in_same_block(item));
        assert!(item.can_be_in_same_block(power1));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut registry = defaults();
        let result = registry.register(ConduitTypeBuilder::new(
            "item",
            ConduitTicker::Graph(Box::new(RedstoneTicker::new(5))),
        ));
        assert!(matches!(result, Err(ConduitError::DuplicateType(key)) if key == "item"));
    }

    #[test]
    fn ids_follow_registration_order() {
        let registry = defaults();
        let keys: Vec<&str> = registry.iter().map(|t| t.key()).collect();
        assert_eq!(keys, ["power1", "power2", "power3", "redstone", "item"]);
        assert!(registry.require("fluid").is_err());
    }
}
