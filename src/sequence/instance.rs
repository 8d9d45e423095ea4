//! Per-participant component instances

use serde::{Deserialize, Serialize};

use crate::core::types::Rarity;

/// One submitted slot: which component, at which rarity and evolution level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSpec {
    pub component_id: String,
    /// Overrides the catalog default when set
    #[serde(default)]
    pub rarity: Option<Rarity>,
    #[serde(default)]
    pub evolution_level: u32,
}

impl SlotSpec {
    pub fn new(component_id: impl Into<String>) -> Self {
        Self {
            component_id: component_id.into(),
            rarity: None,
            evolution_level: 0,
        }
    }

    pub fn with_rarity(mut self, rarity: Rarity) -> Self {
        self.rarity = Some(rarity);
        self
    }

    pub fn with_evolution(mut self, level: u32) -> Self {
        self.evolution_level = level;
        self
    }
}

/// A component placed in a sequence for one evaluation
///
/// Owned by exactly one `SequenceContext` and dropped with it at the end of
/// the evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentInstance {
    pub component_id: String,
    /// Raw submitted slot (1-based, may have gaps before it)
    pub slot: usize,
    /// Position in the compacted sequence (1-based, no gaps)
    pub position: usize,
    /// Effective rarity (instance override or catalog default)
    pub rarity: Rarity,
    pub evolution_level: u32,
}

impl ComponentInstance {
    pub fn rarity_multiplier(&self) -> f64 {
        self.rarity.damage_multiplier()
    }
}
