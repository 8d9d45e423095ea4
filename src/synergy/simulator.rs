//! Sequence simulator - resolves one participant's sequence
//!
//! Two phases, each in ascending position order:
//! web shaping (Modifier, Chain) -> damage resolution (Core, Artifact)
//!
//! Every web shaper runs before any damage dealer, so a modifier at position
//! 5 still reaches a core at position 1. Within a phase, later components see
//! the bonuses and outcomes of earlier ones.

use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;

use super::abilities::{self, AbilityOutcome};
use super::requirements::RequirementEvaluator;
use crate::catalog::ComponentCatalog;
use crate::core::types::{ComponentType, DamageType, Effect, Rarity};
use crate::sequence::{SequenceContext, SlotSpec};

/// Per-component breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentEvaluation {
    pub component_id: String,
    pub position: usize,
    pub slot: usize,
    pub component_type: ComponentType,
    pub rarity: Rarity,
    pub active: bool,
    /// Why the component stayed inactive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub damage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub damage_type: Option<DamageType>,
    pub critical: bool,
    pub effects: Vec<Effect>,
    /// Sibling positions a web shaper reached
    pub touched: usize,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub aux: BTreeMap<String, f64>,
}

/// Outcome of simulating one sequence
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    /// One entry per populated position, in position order
    pub components: Vec<ComponentEvaluation>,
    pub total_damage: f64,
    /// Effects of all activated damage dealers, in evaluation order
    pub effects: Vec<Effect>,
    pub active_components: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

impl SimulationReport {
    /// Component that dealt the most damage (earliest position wins ties)
    pub fn best_component(&self) -> Option<&ComponentEvaluation> {
        self.components
            .iter()
            .filter(|c| c.active && c.damage > 0.0)
            .fold(None, |best: Option<&ComponentEvaluation>, c| match best {
                Some(b) if b.damage >= c.damage => Some(b),
                _ => Some(c),
            })
    }
}

/// Stateless simulator over a catalog
#[derive(Debug, Clone, Copy)]
pub struct SequenceSimulator<'a> {
    catalog: &'a ComponentCatalog,
}

impl<'a> SequenceSimulator<'a> {
    pub fn new(catalog: &'a ComponentCatalog) -> Self {
        Self { catalog }
    }

    /// Build a fresh context from submitted slots and resolve it
    pub fn simulate<R: Rng + ?Sized>(&self, slots: &[Option<SlotSpec>], rng: &mut R) -> SimulationReport {
        let ctx = SequenceContext::build(self.catalog, slots);
        self.run(ctx, rng)
    }

    /// Resolve an already built context
    pub fn run<R: Rng + ?Sized>(&self, mut ctx: SequenceContext<'a>, rng: &mut R) -> SimulationReport {
        let evaluator = RequirementEvaluator::new(self.catalog.conditions());

        let mut components: Vec<ComponentEvaluation> = ctx
            .entries()
            .iter()
            .map(|entry| ComponentEvaluation {
                component_id: entry.instance.component_id.clone(),
                position: entry.instance.position,
                slot: entry.instance.slot,
                component_type: entry.component_type(),
                rarity: entry.instance.rarity,
                active: false,
                reason: None,
                damage: 0.0,
                damage_type: None,
                critical: false,
                effects: Vec::new(),
                touched: 0,
                aux: BTreeMap::new(),
            })
            .collect();

        let mut effects = Vec::new();
        let mut total_damage = 0.0;

        for shaping in [true, false] {
            for index in 0..ctx.len() {
                let Some(entry) = ctx.entries().get(index) else {
                    continue;
                };
                if entry.component_type().shapes_web() != shaping {
                    continue;
                }

                let definition = entry.definition;
                let instance = entry.instance.clone();
                if let Some(reason) = evaluator.first_failure(definition, &instance, &ctx) {
                    tracing::trace!("{} inactive: {}", instance.component_id, reason);
                    components[index].reason = Some(reason);
                    continue;
                }
                components[index].active = true;

                let mut outcome = abilities::execute(definition, &instance, &ctx, rng);
                let emitted = outcome.take_emitted();
                tracing::trace!(
                    "{} at position {} emitted {} bonus records",
                    instance.component_id,
                    instance.position,
                    emitted.len()
                );
                ctx.commit(emitted);

                let evaluation = &mut components[index];
                match outcome {
                    AbilityOutcome::Damage(d) => {
                        ctx.record_outcome(instance.position, d.damage);
                        total_damage += d.damage;
                        effects.extend(d.effects.iter().copied());
                        evaluation.damage = d.damage;
                        evaluation.damage_type = d.damage_type;
                        evaluation.critical = d.critical;
                        evaluation.effects = d.effects;
                        evaluation.aux = d.aux;
                    }
                    AbilityOutcome::WebMutation(w) => {
                        evaluation.touched = w.touched;
                        evaluation.aux = w.aux;
                    }
                }
            }
        }

        let active_components = components.iter().filter(|c| c.active).count();
        SimulationReport {
            components,
            total_damage,
            effects,
            active_components,
            diagnostics: ctx.take_diagnostics(),
        }
    }
}
