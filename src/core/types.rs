//! Core type definitions used throughout the codebase

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a participant (player) in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub u64);

impl ParticipantId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "participant#{}", self.0)
    }
}

/// Tick counter (one full BUILDING -> EVALUATING -> RESULTS cycle)
pub type Tick = u64;

/// Maximum number of slots in a sequence
pub const MAX_SEQUENCE_LENGTH: usize = 5;

/// Component type category
///
/// Core and Artifact produce damage and effects; Modifier and Chain shape the
/// web by writing bonuses onto their siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Core,
    Modifier,
    Chain,
    Artifact,
}

impl ComponentType {
    /// Returns true for the types resolved during damage resolution
    pub fn deals_damage(&self) -> bool {
        matches!(self, ComponentType::Core | ComponentType::Artifact)
    }

    /// Returns true for the types resolved during web shaping
    pub fn shapes_web(&self) -> bool {
        matches!(self, ComponentType::Modifier | ComponentType::Chain)
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentType::Core => "Core",
            ComponentType::Modifier => "Modifier",
            ComponentType::Chain => "Chain",
            ComponentType::Artifact => "Artifact",
        };
        f.write_str(name)
    }
}

/// Rarity tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Rarity {
    Common = 1,
    Uncommon = 2,
    Rare = 3,
    Epic = 4,
    Legendary = 5,
    Mythical = 6,
}

impl Rarity {
    /// Damage multiplier applied by abilities that scale with rarity
    pub fn damage_multiplier(&self) -> f64 {
        match self {
            Rarity::Common => 1.0,
            Rarity::Uncommon => 1.25,
            Rarity::Rare => 1.5,
            Rarity::Epic => 2.0,
            Rarity::Legendary => 3.0,
            Rarity::Mythical => 5.0,
        }
    }

    /// Relative drop weight. Owned by the loot service; carried here so the
    /// table lives in one place.
    pub fn drop_weight(&self) -> f64 {
        match self {
            Rarity::Common => 50.0,
            Rarity::Uncommon => 25.0,
            Rarity::Rare => 15.0,
            Rarity::Epic => 7.0,
            Rarity::Legendary => 2.5,
            Rarity::Mythical => 0.5,
        }
    }

    /// Returns true if this tier outranks the other
    pub fn outranks(&self, other: &Rarity) -> bool {
        (*self as u8) > (*other as u8)
    }
}

/// Closed tag vocabulary: elemental, mechanical and conceptual labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    // Elemental
    Fire,
    Water,
    Earth,
    Air,
    Lightning,
    Void,
    Light,
    Shadow,
    // Mechanical
    Mechanical,
    Kinetic,
    Resonant,
    // Conceptual
    Arcane,
    Temporal,
    Ancient,
    Primal,
}

/// Damage type reported by Execute abilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DamageType {
    Physical,
    Fire,
    Frost,
    Lightning,
    Arcane,
    Void,
}

/// Kind of side effect produced by an ability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Burn,
    Slow,
    Shock,
    Weaken,
    Empower,
}

/// A side effect: type, power and duration (in turns)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    pub kind: EffectKind,
    pub power: f64,
    pub duration: u32,
}

impl Effect {
    pub fn new(kind: EffectKind, power: f64, duration: u32) -> Self {
        Self { kind, power, duration }
    }
}
