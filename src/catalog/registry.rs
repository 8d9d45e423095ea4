//! Component catalog for loading, validating and looking up definitions.
//!
//! The catalog is built once at process start and is read-only afterwards.
//! Lookups hand out shared references; nothing in an evaluation ever writes
//! back to a definition.

use ahash::AHashMap;
use std::path::Path;
use std::sync::Arc;

use super::schema::{CatalogFile, ComponentDefinition, Requirement};
use crate::core::error::{EngineError, Result, SchemaError};
use crate::core::types::{ComponentType, MAX_SEQUENCE_LENGTH};
use crate::sequence::{ComponentInstance, SequenceContext};

/// Catalog data shipped with the crate
const BUILTIN_CATALOG: &str = include_str!("../../data/components.toml");

/// Executable condition behind a `Custom` requirement.
///
/// Conditions only receive shared references and must not have side effects.
/// Returning `Err` means the condition itself broke; the requirement then
/// fails closed.
pub type CustomCondition = Arc<
    dyn Fn(&ComponentInstance, &SequenceContext<'_>) -> std::result::Result<bool, String>
        + Send
        + Sync,
>;

/// Named custom conditions available to catalog definitions
#[derive(Clone, Default)]
pub struct ConditionRegistry {
    conditions: AHashMap<String, CustomCondition>,
}

impl ConditionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the conditions the shipped catalog uses
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        // No component id appears twice in the sequence
        registry.register("all_unique", |_, ctx| {
            let mut seen = std::collections::BTreeSet::new();
            Ok(ctx
                .entries()
                .iter()
                .all(|entry| seen.insert(entry.definition.id.as_str())))
        });

        registry.register("odd_position", |instance, _| Ok(instance.position % 2 == 1));

        registry.register("full_sequence", |_, ctx| Ok(ctx.len() == MAX_SEQUENCE_LENGTH));

        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, condition: F)
    where
        F: Fn(&ComponentInstance, &SequenceContext<'_>) -> std::result::Result<bool, String>
            + Send
            + Sync
            + 'static,
    {
        self.conditions.insert(name.into(), Arc::new(condition));
    }

    pub fn get(&self, name: &str) -> Option<&CustomCondition> {
        self.conditions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.conditions.contains_key(name)
    }
}

impl std::fmt::Debug for ConditionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.conditions.keys().collect();
        names.sort();
        f.debug_struct("ConditionRegistry")
            .field("conditions", &names)
            .finish()
    }
}

/// Immutable registry of component definitions
#[derive(Debug)]
pub struct ComponentCatalog {
    /// Definitions indexed by id
    definitions: AHashMap<String, ComponentDefinition>,
    /// Registration order, for stable iteration
    order: Vec<String>,
    /// Map from type to ids for filtering
    by_type: AHashMap<ComponentType, Vec<String>>,
    conditions: ConditionRegistry,
}

impl ComponentCatalog {
    /// Create an empty catalog with the builtin custom conditions
    pub fn new() -> Self {
        Self::with_conditions(ConditionRegistry::with_builtins())
    }

    /// Create an empty catalog with a caller-supplied condition registry
    pub fn with_conditions(conditions: ConditionRegistry) -> Self {
        Self {
            definitions: AHashMap::new(),
            order: Vec::new(),
            by_type: AHashMap::new(),
            conditions,
        }
    }

    /// The catalog shipped in `data/components.toml`
    pub fn builtin() -> Result<Self> {
        let mut catalog = Self::new();
        catalog.load_str(BUILTIN_CATALOG)?;
        Ok(catalog)
    }

    /// Validate and register a definition
    pub fn register(&mut self, definition: ComponentDefinition) -> std::result::Result<(), SchemaError> {
        self.validate(&definition)?;
        if self.definitions.contains_key(&definition.id) {
            return Err(SchemaError::DuplicateId(definition.id));
        }

        self.by_type
            .entry(definition.component_type)
            .or_default()
            .push(definition.id.clone());
        self.order.push(definition.id.clone());
        self.definitions.insert(definition.id.clone(), definition);
        Ok(())
    }

    /// Load every `[[component]]` entry from a TOML string
    pub fn load_str(&mut self, content: &str) -> Result<usize> {
        let file: CatalogFile = toml::from_str(content)?;
        let count = file.component.len();
        for definition in file.component {
            self.register(definition)?;
        }
        Ok(count)
    }

    /// Load a catalog TOML file
    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)?;
        let count = self.load_str(&content)?;
        tracing::debug!("Loaded {} components from {}", count, path.display());
        Ok(count)
    }

    /// Load all .toml files from a directory recursively
    pub fn load_directory(&mut self, path: &Path) -> Result<usize> {
        let mut count = 0;
        let mut entries: Vec<_> = std::fs::read_dir(path)?.collect::<std::io::Result<_>>()?;
        entries.sort_by_key(|entry| entry.path());

        for entry in entries {
            let entry_path = entry.path();
            if entry_path.is_dir() {
                count += self.load_directory(&entry_path)?;
            } else if entry_path.extension().map_or(false, |ext| ext == "toml") {
                count += self.load_file(&entry_path)?;
            }
        }
        Ok(count)
    }

    /// Look up a definition, failing with a catalog lookup error
    pub fn lookup(&self, id: &str) -> Result<&ComponentDefinition> {
        self.definitions
            .get(id)
            .ok_or_else(|| EngineError::CatalogLookup { id: id.to_string() })
    }

    pub fn get(&self, id: &str) -> Option<&ComponentDefinition> {
        self.definitions.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.definitions.contains_key(id)
    }

    /// All definitions of one component type, in registration order
    pub fn by_type(&self, component_type: ComponentType) -> Vec<&ComponentDefinition> {
        self.by_type
            .get(&component_type)
            .map(|ids| ids.iter().filter_map(|id| self.definitions.get(id)).collect())
            .unwrap_or_default()
    }

    /// Ids in registration order
    pub fn ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn conditions(&self) -> &ConditionRegistry {
        &self.conditions
    }

    /// Schema check for a single definition
    pub fn validate(&self, definition: &ComponentDefinition) -> std::result::Result<(), SchemaError> {
        if definition.id.trim().is_empty() {
            return Err(SchemaError::MissingId);
        }

        if !definition.ability.fits(definition.component_type) {
            return Err(SchemaError::AbilityMismatch {
                id: definition.id.clone(),
                component_type: definition.component_type.to_string(),
                ability: definition.ability.to_string(),
            });
        }

        if let Some((stat, _)) = definition.base_stats.iter().find(|(_, v)| !v.is_finite()) {
            return Err(SchemaError::InvalidStat {
                id: definition.id.clone(),
                stat: stat.clone(),
            });
        }

        for (index, requirement) in definition.requirements.iter().enumerate() {
            if let Some(reason) = self.requirement_problem(requirement) {
                return Err(SchemaError::InvalidRequirement {
                    id: definition.id.clone(),
                    index,
                    kind: requirement.kind_name().to_string(),
                    reason,
                });
            }
        }

        Ok(())
    }

    /// Fields each predicate kind demands
    fn requirement_problem(&self, requirement: &Requirement) -> Option<String> {
        match requirement {
            Requirement::Sandwich { previous, next } => {
                if previous.is_empty() || next.is_empty() {
                    return Some("both neighbor criteria must set at least one field".into());
                }
            }
            Requirement::SequenceCount { criteria, minimum } => {
                if criteria.is_empty() {
                    return Some("criteria must set at least one field".into());
                }
                if *minimum == 0 {
                    return Some("minimum must be at least 1".into());
                }
            }
            Requirement::GlobalPresence { criteria } => {
                if criteria.is_empty() {
                    return Some("criteria must set at least one field".into());
                }
            }
            Requirement::TagDiversity { minimum } => {
                if *minimum == 0 {
                    return Some("minimum must be at least 1".into());
                }
            }
            Requirement::Custom { condition } => {
                if !self.conditions.contains(condition) {
                    return Some(format!("no executable condition named '{}'", condition));
                }
            }
            Requirement::Position { .. }
            | Requirement::AdjacentTag { .. }
            | Requirement::AdjacentType { .. }
            | Requirement::EvolutionStage { .. } => {}
        }
        None
    }
}

impl Default for ComponentCatalog {
    fn default() -> Self {
        Self::new()
    }
}
