//! Consolidation Engine
//!
//! Smelts weapons by class bucket and climbs the metal ladder so fewer,
//! larger items travel through the pipeline.

pub mod crates;
pub mod engine;
pub mod ladder;
pub mod smelt;

pub use crates::crates_to_delete;
pub use engine::{ConsolidationEngine, ConsolidationReport};
pub use ladder::{craft_output, plan_metal_tier};
pub use smelt::{partition, plan_weapon_smelt, ClassBuckets, WeaponPlan};
