use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque 64-bit platform identity of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for AgentId {
    fn from(raw: u64) -> Self {
        AgentId(raw)
    }
}

/// Opaque identifier of one inventory item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The nine playable classes an item can be usable by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacterClass {
    Scout,
    Soldier,
    Pyro,
    Demoman,
    Heavy,
    Engineer,
    Medic,
    Sniper,
    Spy,
}

impl CharacterClass {
    pub const ALL: [CharacterClass; 9] = [
        CharacterClass::Scout,
        CharacterClass::Soldier,
        CharacterClass::Pyro,
        CharacterClass::Demoman,
        CharacterClass::Heavy,
        CharacterClass::Engineer,
        CharacterClass::Medic,
        CharacterClass::Sniper,
        CharacterClass::Spy,
    ];

    /// Position of this class in [`CharacterClass::ALL`]
    pub fn index(&self) -> usize {
        match self {
            CharacterClass::Scout => 0,
            CharacterClass::Soldier => 1,
            CharacterClass::Pyro => 2,
            CharacterClass::Demoman => 3,
            CharacterClass::Heavy => 4,
            CharacterClass::Engineer => 5,
            CharacterClass::Medic => 6,
            CharacterClass::Sniper => 7,
            CharacterClass::Spy => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CharacterClass::Scout => "Scout",
            CharacterClass::Soldier => "Soldier",
            CharacterClass::Pyro => "Pyro",
            CharacterClass::Demoman => "Demoman",
            CharacterClass::Heavy => "Heavy",
            CharacterClass::Engineer => "Engineer",
            CharacterClass::Medic => "Medic",
            CharacterClass::Sniper => "Sniper",
            CharacterClass::Spy => "Spy",
        }
    }
}

impl fmt::Display for CharacterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CharacterClass {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        CharacterClass::ALL
            .iter()
            .copied()
            .find(|class| class.as_str().eq_ignore_ascii_case(raw.trim()))
            .ok_or_else(|| format!("Unknown class: {}", raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Normal,
    #[default]
    Unique,
    Vintage,
    Genuine,
    Strange,
    Unusual,
    #[serde(other)]
    Other,
}

/// Crafting material from the item schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CraftMaterial {
    Weapon,
    Hat,
    Tool,
    CraftBar,
    #[serde(other)]
    Other,
}

/// Metal currency, lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetalTier {
    Scrap,
    Reclaimed,
    Refined,
}

impl MetalTier {
    /// Tiers that can be combined into the next one, in crafting order
    pub const COMBINABLE: [MetalTier; 2] = [MetalTier::Scrap, MetalTier::Reclaimed];

    pub fn defindex(&self) -> u32 {
        match self {
            MetalTier::Scrap => 5000,
            MetalTier::Reclaimed => 5001,
            MetalTier::Refined => 5002,
        }
    }

    pub fn from_defindex(defindex: u32) -> Option<Self> {
        match defindex {
            5000 => Some(MetalTier::Scrap),
            5001 => Some(MetalTier::Reclaimed),
            5002 => Some(MetalTier::Refined),
            _ => None,
        }
    }

    pub fn next(&self) -> Option<MetalTier> {
        match self {
            MetalTier::Scrap => Some(MetalTier::Reclaimed),
            MetalTier::Reclaimed => Some(MetalTier::Refined),
            MetalTier::Refined => None,
        }
    }
}

impl fmt::Display for MetalTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetalTier::Scrap => write!(f, "scrap"),
            MetalTier::Reclaimed => write!(f, "reclaimed"),
            MetalTier::Refined => write!(f, "refined"),
        }
    }
}

/// Standard supply crates
pub const STANDARD_CRATES: [u32; 3] = [5022, 5041, 5045];
/// Salvaged and rare-drop crates, handled like ordinary items
pub const RARE_DROP_CRATES: [u32; 3] = [5068, 5635, 5639];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrateKind {
    Standard,
    RareDrop,
    Event,
}

/// Which crates a transfer or deletion pass applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CratePolicy {
    #[default]
    None,
    Standard,
    Event,
    All,
}

impl CratePolicy {
    /// Rare-drop crates are never covered; they travel like ordinary items.
    pub fn covers(&self, kind: CrateKind) -> bool {
        match (self, kind) {
            (_, CrateKind::RareDrop) => false,
            (CratePolicy::None, _) => false,
            (CratePolicy::Standard, CrateKind::Standard) => true,
            (CratePolicy::Event, CrateKind::Event) => true,
            (CratePolicy::All, _) => true,
            _ => false,
        }
    }
}

impl FromStr for CratePolicy {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" | "0" => Ok(CratePolicy::None),
            "standard" | "1" => Ok(CratePolicy::Standard),
            "event" | "2" => Ok(CratePolicy::Event),
            "all" | "3" => Ok(CratePolicy::All),
            _ => Err(format!("invalid crate policy '{}'; expected none|standard|event|all", raw)),
        }
    }
}

/// One inventory item as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// Schema category code
    pub defindex: u32,
    #[serde(default = "default_true")]
    pub tradable: bool,
    #[serde(default = "default_true")]
    pub craftable: bool,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub usable_by: Vec<CharacterClass>,
    #[serde(default)]
    pub material: Option<CraftMaterial>,
    #[serde(default)]
    pub crate_series: Option<u32>,
}

fn default_true() -> bool {
    true
}

impl Item {
    /// A plain tradable, craftable unique item with no class or material data
    pub fn new(id: u64, defindex: u32) -> Self {
        Self {
            id: ItemId(id),
            defindex,
            tradable: true,
            craftable: true,
            quality: Quality::Unique,
            usable_by: Vec::new(),
            material: None,
            crate_series: None,
        }
    }

    pub fn weapon(id: u64, defindex: u32, usable_by: &[CharacterClass]) -> Self {
        Self {
            usable_by: usable_by.to_vec(),
            material: Some(CraftMaterial::Weapon),
            ..Self::new(id, defindex)
        }
    }

    pub fn metal(id: u64, tier: MetalTier) -> Self {
        Self {
            material: Some(CraftMaterial::CraftBar),
            ..Self::new(id, tier.defindex())
        }
    }

    pub fn is_weapon(&self) -> bool {
        self.material == Some(CraftMaterial::Weapon)
    }

    /// Weapon that can be smelted: tradable, craftable and unique quality
    pub fn is_clean_weapon(&self) -> bool {
        self.is_weapon() && self.tradable && self.craftable && self.quality == Quality::Unique
    }

    pub fn metal_tier(&self) -> Option<MetalTier> {
        MetalTier::from_defindex(self.defindex)
    }

    pub fn crate_kind(&self) -> Option<CrateKind> {
        if STANDARD_CRATES.contains(&self.defindex) {
            Some(CrateKind::Standard)
        } else if RARE_DROP_CRATES.contains(&self.defindex) {
            Some(CrateKind::RareDrop)
        } else if self.crate_series.is_some() {
            Some(CrateKind::Event)
        } else {
            None
        }
    }

    pub fn is_multi_class(&self) -> bool {
        self.usable_by.len() > 1
    }
}
