use crate::domain::{CratePolicy, Inventory, ItemId};

/// Crates the delete policy covers, minus saved series
pub fn crates_to_delete(inventory: &Inventory, policy: CratePolicy, saved: &[u32]) -> Vec<ItemId> {
    inventory
        .items
        .iter()
        .filter(|item| item.crate_kind().is_some_and(|kind| policy.covers(kind)))
        .filter(|item| !item.crate_series.is_some_and(|series| saved.contains(&series)))
        .map(|item| item.id)
        .collect()
}
