use crate::domain::{Item, ItemId, MetalTier};

/// Groups of three items of `tier`, in inventory order. Fewer than three
/// left over are not crafted.
pub fn plan_metal_tier(items: &[Item], tier: MetalTier) -> Vec<[ItemId; 3]> {
    let ids: Vec<ItemId> = items
        .iter()
        .filter(|item| item.metal_tier() == Some(tier))
        .map(|item| item.id)
        .collect();
    ids.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect()
}

/// What the platform produces from a craft, if the recipe is valid:
/// two weapons make scrap, three of a lower metal make the next tier.
pub fn craft_output(items: &[Item]) -> Option<MetalTier> {
    match items {
        [a, b] if a.is_weapon() && b.is_weapon() => Some(MetalTier::Scrap),
        [a, b, c] => {
            let tier = a.metal_tier()?;
            if b.metal_tier() == Some(tier) && c.metal_tier() == Some(tier) {
                tier.next()
            } else {
                None
            }
        }
        _ => None,
    }
}
