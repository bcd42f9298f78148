//! Weapon smelting plan: two weapons of a shared class make one scrap

use serde::Serialize;

use crate::domain::{CharacterClass, Item, ItemId};

/// Weapons sorted by who can use them
#[derive(Debug, Clone, Default)]
pub struct ClassBuckets {
    /// Single-class weapons, indexed by [`CharacterClass::index`]
    pub by_class: [Vec<Item>; 9],
    /// Weapons usable by more than one class
    pub multi: Vec<Item>,
}

impl ClassBuckets {
    pub fn bucket(&self, class: CharacterClass) -> &[Item] {
        &self.by_class[class.index()]
    }

    pub fn len(&self) -> usize {
        self.by_class.iter().map(Vec::len).sum::<usize>() + self.multi.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sorts items into class buckets, preserving inventory order.
/// Items with no usable class are skipped.
pub fn partition(items: &[Item]) -> ClassBuckets {
    let mut buckets = ClassBuckets::default();
    for item in items {
        match item.usable_by.as_slice() {
            [] => continue,
            [class] => buckets.by_class[class.index()].push(item.clone()),
            _ => buckets.multi.push(item.clone()),
        }
    }
    buckets
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WeaponPlan {
    /// Pairs to craft, in order
    pub pairs: Vec<[ItemId; 2]>,
    /// Weapons left for the next run
    pub leftovers: Vec<ItemId>,
}

/// Pairs weapons for smelting.
///
/// Same-class pairs first (most recent two at a time), then each odd
/// single-class weapon with the first multi-class weapon that lists its
/// class, then the remaining multi-class weapons with each other.
pub fn plan_weapon_smelt(items: &[Item]) -> WeaponPlan {
    let ClassBuckets {
        mut by_class,
        mut multi,
    } = partition(items);
    let mut plan = WeaponPlan::default();

    for bucket in by_class.iter_mut() {
        while bucket.len() >= 2 {
            if let (Some(a), Some(b)) = (bucket.pop(), bucket.pop()) {
                plan.pairs.push([a.id, b.id]);
            }
        }
    }

    for (index, bucket) in by_class.iter_mut().enumerate() {
        let Some(odd) = bucket.pop() else {
            continue;
        };
        let class = CharacterClass::ALL[index];
        match multi.iter().position(|m| m.usable_by.contains(&class)) {
            Some(pos) => {
                let partner = multi.remove(pos);
                plan.pairs.push([odd.id, partner.id]);
            }
            None => plan.leftovers.push(odd.id),
        }
    }

    while multi.len() >= 2 {
        if let (Some(a), Some(b)) = (multi.pop(), multi.pop()) {
            plan.pairs.push([a.id, b.id]);
        }
    }
    plan.leftovers.extend(multi.iter().map(|m| m.id));

    plan
}
