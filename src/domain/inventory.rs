use serde::{Deserialize, Serialize};

use super::item::{CrateKind, CratePolicy, Item, ItemId, MetalTier};

/// Default backpack size when the platform does not report one
pub const DEFAULT_SLOTS: usize = 300;

/// Point-in-time snapshot of one agent's backpack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub items: Vec<Item>,
    #[serde(default = "default_slots")]
    pub slots: usize,
    #[serde(default)]
    pub free_to_play: bool,
}

fn default_slots() -> usize {
    DEFAULT_SLOTS
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Inventory {
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items,
            slots: DEFAULT_SLOTS,
            free_to_play: false,
        }
    }

    pub fn with_slots(mut self, slots: usize) -> Self {
        self.slots = slots;
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.get(id).is_some()
    }

    /// Tradable items that are not standard crates
    pub fn non_crates(&self) -> Vec<Item> {
        self.items
            .iter()
            .filter(|item| item.tradable && item.crate_kind() != Some(CrateKind::Standard))
            .cloned()
            .collect()
    }

    /// Tradable items a giver should hand over under the given crate transfer policy
    pub fn trade_items(&self, transfer: CratePolicy) -> Vec<Item> {
        self.items
            .iter()
            .filter(|item| item.tradable)
            .filter(|item| match item.crate_kind() {
                None | Some(CrateKind::RareDrop) => true,
                Some(kind) => transfer.covers(kind),
            })
            .cloned()
            .collect()
    }

    pub fn clean_weapons(&self) -> Vec<Item> {
        self.items
            .iter()
            .filter(|item| item.is_clean_weapon())
            .cloned()
            .collect()
    }

    pub fn metal(&self, tier: MetalTier) -> Vec<Item> {
        self.items
            .iter()
            .filter(|item| item.metal_tier() == Some(tier))
            .cloned()
            .collect()
    }

    /// True once fewer than `margin` slots are free
    pub fn near_capacity(&self, margin: usize) -> bool {
        self.items.len() > self.slots.saturating_sub(margin)
    }

    pub fn at_capacity(&self) -> bool {
        self.items.len() >= self.slots
    }
}
