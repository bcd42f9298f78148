use serde::Serialize;
use tracing::{debug, info, warn};

use super::crates::crates_to_delete;
use super::ladder::plan_metal_tier;
use super::smelt::plan_weapon_smelt;
use crate::config::{pause, Pacing};
use crate::domain::{CratePolicy, ItemId, MetalTier};
use crate::error::Result;
use crate::exchange::Platform;

/// What one consolidation pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsolidationReport {
    pub weapon_crafts: usize,
    pub weapon_leftovers: usize,
    pub scrap_combined: usize,
    pub reclaimed_combined: usize,
    pub failed_crafts: usize,
    pub crates_deleted: usize,
}

impl ConsolidationReport {
    pub fn crafts(&self) -> usize {
        self.weapon_crafts + self.scrap_combined + self.reclaimed_combined
    }
}

/// Reduces many small items into fewer large ones between exchanges
#[derive(Debug, Clone)]
pub struct ConsolidationEngine {
    craft_pause_ms: u64,
    refresh_pause_ms: u64,
}

impl ConsolidationEngine {
    pub fn new(pacing: &Pacing) -> Self {
        Self {
            craft_pause_ms: pacing.craft_ms,
            refresh_pause_ms: pacing.inventory_refresh_ms,
        }
    }

    /// Smelts clean weapons, then climbs the metal ladder. Crafting mode is
    /// left again even when a stage fails.
    pub async fn consolidate(&self, platform: &dyn Platform) -> Result<ConsolidationReport> {
        let mut report = ConsolidationReport::default();
        platform.set_crafting_mode(true).await?;
        let result = self.run_stages(platform, &mut report).await;
        if let Err(e) = platform.set_crafting_mode(false).await {
            warn!(error = %e, "Could not leave crafting mode");
        }
        result?;

        info!(
            weapons = report.weapon_crafts,
            scrap = report.scrap_combined,
            reclaimed = report.reclaimed_combined,
            failed = report.failed_crafts,
            "Consolidation finished"
        );
        Ok(report)
    }

    async fn run_stages(&self, platform: &dyn Platform, report: &mut ConsolidationReport) -> Result<()> {
        let inventory = platform.own_inventory().await?;
        let weapons = inventory.clean_weapons();
        if weapons.len() < 2 {
            warn!(count = weapons.len(), "Not enough weapons to smelt");
        } else {
            let plan = plan_weapon_smelt(&weapons);
            report.weapon_leftovers = plan.leftovers.len();
            for pair in &plan.pairs {
                if self.craft(platform, pair, report).await {
                    report.weapon_crafts += 1;
                }
            }
        }

        for tier in MetalTier::COMBINABLE {
            pause(self.refresh_pause_ms).await;
            let inventory = platform.own_inventory().await?;
            let groups = plan_metal_tier(&inventory.items, tier);
            debug!(tier = %tier, groups = groups.len(), "Combining metal");
            for group in &groups {
                if self.craft(platform, group, report).await {
                    match tier {
                        MetalTier::Scrap => report.scrap_combined += 1,
                        _ => report.reclaimed_combined += 1,
                    }
                }
            }
        }
        Ok(())
    }

    async fn craft(&self, platform: &dyn Platform, ids: &[ItemId], report: &mut ConsolidationReport) -> bool {
        let ok = match platform.craft(ids).await {
            Ok(ok) => ok,
            Err(e) => {
                warn!(error = %e, items = ?ids, "Craft failed");
                false
            }
        };
        if !ok {
            report.failed_crafts += 1;
        }
        pause(self.craft_pause_ms).await;
        ok
    }

    /// Deletes crates covered by `policy`, keeping saved series
    pub async fn delete_crates(&self, platform: &dyn Platform, policy: CratePolicy, saved: &[u32]) -> Result<usize> {
        if policy == CratePolicy::None {
            return Ok(0);
        }
        let inventory = platform.own_inventory().await?;
        let mut deleted = 0;
        for id in crates_to_delete(&inventory, policy, saved) {
            match platform.delete_item(id).await {
                Ok(true) => deleted += 1,
                Ok(false) => warn!(item = %id, "Platform refused crate deletion"),
                Err(e) => warn!(item = %id, error = %e, "Crate deletion failed"),
            }
        }
        if deleted > 0 {
            info!(deleted, policy = ?policy, "Deleted crates");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CharacterClass, Inventory, Item};
    use crate::testkit::FakePlatform;

    fn engine() -> ConsolidationEngine {
        ConsolidationEngine::new(&Pacing::none())
    }

    #[tokio::test]
    async fn seven_scrap_leave_one() {
        let items = (0..7).map(|i| Item::metal(i, MetalTier::Scrap)).collect();
        let platform = FakePlatform::new(1, Inventory::new(items));

        let report = engine().consolidate(&platform).await.unwrap();

        assert_eq!(report.scrap_combined, 2);
        let inv = platform.inventory();
        assert_eq!(inv.metal(MetalTier::Reclaimed).len(), 2);
        assert_eq!(inv.metal(MetalTier::Scrap).len(), 1);
        assert!(!platform.crafting_mode());
    }

    #[tokio::test]
    async fn weapons_smelt_then_metal_climbs() {
        // Six scout weapons -> three scrap -> one reclaimed
        let items = (0..6).map(|i| Item::weapon(i, 13, &[CharacterClass::Scout])).collect();
        let platform = FakePlatform::new(1, Inventory::new(items));

        let report = engine().consolidate(&platform).await.unwrap();

        assert_eq!(report.weapon_crafts, 3);
        assert_eq!(report.scrap_combined, 1);
        let inv = platform.inventory();
        assert_eq!(inv.len(), 1);
        assert_eq!(inv.metal(MetalTier::Reclaimed).len(), 1);
    }

    #[tokio::test]
    async fn metal_runs_with_a_single_weapon() {
        let mut items: Vec<Item> = (0..3).map(|i| Item::metal(i, MetalTier::Reclaimed)).collect();
        items.push(Item::weapon(10, 13, &[CharacterClass::Pyro]));
        let platform = FakePlatform::new(1, Inventory::new(items));

        let report = engine().consolidate(&platform).await.unwrap();

        assert_eq!(report.weapon_crafts, 0);
        assert_eq!(report.reclaimed_combined, 1);
        assert_eq!(platform.inventory().metal(MetalTier::Refined).len(), 1);
    }

    #[tokio::test]
    async fn delete_crates_respects_policy() {
        let mut saved = Item::new(2, 5022);
        saved.crate_series = Some(8);
        let platform = FakePlatform::new(1, Inventory::new(vec![Item::new(1, 5022), saved, Item::new(3, 5068)]));

        let deleted = engine().delete_crates(&platform, CratePolicy::All, &[8]).await.unwrap();

        assert_eq!(deleted, 1);
        assert_eq!(platform.inventory().len(), 2);
    }
}
