//! Component definition schema types for TOML deserialization.
//!
//! A definition is static data: type, rarity, base stats, tags, activation
//! requirements and the name of the ability behavior it runs. Behaviors
//! themselves are code (see `synergy::abilities`); the data only selects one
//! and supplies its numeric parameters.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::core::types::{ComponentType, Rarity, Tag};

/// Complete component definition (catalog entry)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDefinition {
    /// Unique string identifier
    pub id: String,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    /// Default rarity; instances may override it
    pub rarity: Rarity,
    /// Ability-specific numeric parameters
    #[serde(default)]
    pub base_stats: BTreeMap<String, f64>,
    #[serde(default)]
    pub tags: BTreeSet<Tag>,
    /// Activation predicates, all of which must pass
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    pub ability: Ability,
}

impl ComponentDefinition {
    /// Read a base stat, falling back to `default` when the data omits it
    pub fn stat(&self, name: &str, default: f64) -> f64 {
        self.base_stats.get(name).copied().unwrap_or(default)
    }

    pub fn has_tag(&self, tag: Tag) -> bool {
        self.tags.contains(&tag)
    }

    /// Display name, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Which position rule a Position requirement enforces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionRule {
    /// Position 1
    First,
    /// Position 2
    Second,
    /// Position N-1, the one before last
    Fourth,
    /// Position N
    Last,
    /// Anything strictly between first and last
    Middle,
    Any,
}

/// Neighbor direction for adjacency predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Previous,
    Next,
    Either,
}

/// Criteria object used by sandwich, count and presence predicates.
///
/// Every field that is set must match; an empty criteria matches nothing
/// useful and is rejected by catalog validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Criteria {
    #[serde(rename = "type")]
    pub component_type: Option<ComponentType>,
    pub tag: Option<Tag>,
    pub rarity: Option<Rarity>,
    pub id: Option<String>,
}

impl Criteria {
    pub fn of_type(component_type: ComponentType) -> Self {
        Self {
            component_type: Some(component_type),
            ..Self::default()
        }
    }

    pub fn with_tag(tag: Tag) -> Self {
        Self {
            tag: Some(tag),
            ..Self::default()
        }
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.component_type.is_none()
            && self.tag.is_none()
            && self.rarity.is_none()
            && self.id.is_none()
    }

    /// Check a component against this criteria. `rarity` is the instance's
    /// effective rarity, not the catalog default.
    pub fn matches(&self, definition: &ComponentDefinition, rarity: Rarity) -> bool {
        if let Some(component_type) = self.component_type {
            if definition.component_type != component_type {
                return false;
            }
        }
        if let Some(tag) = self.tag {
            if !definition.has_tag(tag) {
                return false;
            }
        }
        if let Some(required) = self.rarity {
            if rarity != required {
                return false;
            }
        }
        if let Some(ref id) = self.id {
            if &definition.id != id {
                return false;
            }
        }
        true
    }
}

/// Activation predicate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requirement {
    Position {
        position: PositionRule,
    },
    AdjacentTag {
        tag: Tag,
        direction: Direction,
    },
    AdjacentType {
        #[serde(rename = "type")]
        component_type: ComponentType,
        direction: Direction,
    },
    Sandwich {
        previous: Criteria,
        next: Criteria,
    },
    SequenceCount {
        criteria: Criteria,
        minimum: usize,
    },
    TagDiversity {
        minimum: usize,
    },
    GlobalPresence {
        criteria: Criteria,
    },
    EvolutionStage {
        minimum: u32,
    },
    /// Named condition looked up in the catalog's condition registry
    Custom {
        condition: String,
    },
}

impl Requirement {
    /// Short name of the predicate kind, for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Requirement::Position { .. } => "position",
            Requirement::AdjacentTag { .. } => "adjacent_tag",
            Requirement::AdjacentType { .. } => "adjacent_type",
            Requirement::Sandwich { .. } => "sandwich",
            Requirement::SequenceCount { .. } => "sequence_count",
            Requirement::TagDiversity { .. } => "tag_diversity",
            Requirement::GlobalPresence { .. } => "global_presence",
            Requirement::EvolutionStage { .. } => "evolution_stage",
            Requirement::Custom { .. } => "custom",
        }
    }
}

/// The one ability a component runs when activated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ability {
    /// Produces damage and effects (Core, Artifact)
    Execute(ExecuteBehavior),
    /// Writes bonuses onto siblings (Modifier, Chain)
    ModifyWeb(WebBehavior),
}

impl Ability {
    /// Whether this ability is legal for the given component type
    pub fn fits(&self, component_type: ComponentType) -> bool {
        match self {
            Ability::Execute(_) => component_type.deals_damage(),
            Ability::ModifyWeb(_) => component_type.shapes_web(),
        }
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ability::Execute(behavior) => write!(f, "execute:{:?}", behavior),
            Ability::ModifyWeb(behavior) => write!(f, "modify_web:{:?}", behavior),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecuteBehavior {
    Vanguard,
    Ember,
    Frost,
    Storm,
    Echo,
    Prism,
    Genesis,
    Kindling,
    Relic,
    VoidShard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebBehavior {
    Amplify,
    Catalyze,
    Resonate,
    Overclock,
    ChainLink,
    Conduit,
    Seed,
}

/// Top-level layout of a catalog TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub component: Vec<ComponentDefinition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMBER: &str = r#"
        id = "ember_core"
        name = "Ember Core"
        type = "core"
        rarity = "common"
        tags = ["fire", "primal"]
        ability = { execute = "ember" }

        [base_stats]
        base_damage = 80.0
    "#;

    #[test]
    fn test_definition_from_toml() {
        let def: ComponentDefinition = toml::from_str(EMBER).expect("should parse");
        assert_eq!(def.id, "ember_core");
        assert_eq!(def.component_type, ComponentType::Core);
        assert_eq!(def.ability, Ability::Execute(ExecuteBehavior::Ember));
        assert!(def.has_tag(Tag::Fire));
        assert!(def.requirements.is_empty());
        assert_eq!(def.stat("base_damage", 0.0), 80.0);
        assert_eq!(def.stat("missing", 7.5), 7.5);
    }

    #[test]
    fn test_requirements_from_toml() {
        let content = r#"
            id = "chain_link"
            type = "chain"
            rarity = "common"
            ability = { modify_web = "chain_link" }

            [[requirements]]
            kind = "sandwich"
            previous = { type = "core" }
            next = { type = "core" }

            [[requirements]]
            kind = "adjacent_tag"
            tag = "water"
            direction = "either"
        "#;
        let def: ComponentDefinition = toml::from_str(content).expect("should parse");
        assert_eq!(def.requirements.len(), 2);
        assert_eq!(
            def.requirements[0],
            Requirement::Sandwich {
                previous: Criteria::of_type(ComponentType::Core),
                next: Criteria::of_type(ComponentType::Core),
            }
        );
        assert_eq!(def.requirements[1].kind_name(), "adjacent_tag");
    }

    #[test]
    fn test_unknown_rarity_rejected() {
        let content = EMBER.replace("\"common\"", "\"ultra\"");
        assert!(toml::from_str::<ComponentDefinition>(&content).is_err());
    }

    #[test]
    fn test_ability_fits_component_type() {
        let execute = Ability::Execute(ExecuteBehavior::Ember);
        let web = Ability::ModifyWeb(WebBehavior::Amplify);
        assert!(execute.fits(ComponentType::Core));
        assert!(execute.fits(ComponentType::Artifact));
        assert!(!execute.fits(ComponentType::Chain));
        assert!(web.fits(ComponentType::Modifier));
        assert!(!web.fits(ComponentType::Core));
    }

    #[test]
    fn test_criteria_uses_instance_rarity() {
        let def: ComponentDefinition = toml::from_str(EMBER).unwrap();
        let criteria = Criteria {
            rarity: Some(Rarity::Epic),
            ..Criteria::default()
        };
        assert!(!criteria.matches(&def, Rarity::Common));
        assert!(criteria.matches(&def, Rarity::Epic));
        assert!(Criteria::with_tag(Tag::Fire).matches(&def, Rarity::Common));
        assert!(!Criteria::with_id("frost_core").matches(&def, Rarity::Common));
    }
}
