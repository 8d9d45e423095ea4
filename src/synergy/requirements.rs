//! Requirement evaluation against a sequence context
//!
//! All requirements of a definition must pass. Positions and neighbors are
//! taken from the compacted sequence; asking for a neighbor past either end
//! is "no match", never an error.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::catalog::schema::{ComponentDefinition, Direction, PositionRule, Requirement};
use crate::catalog::ConditionRegistry;
use crate::core::error::{panic_reason, EngineError};
use crate::sequence::{ComponentInstance, SequenceContext};

/// Evaluates activation requirements using a catalog's custom conditions
#[derive(Debug, Clone, Copy)]
pub struct RequirementEvaluator<'a> {
    conditions: &'a ConditionRegistry,
}

impl<'a> RequirementEvaluator<'a> {
    pub fn new(conditions: &'a ConditionRegistry) -> Self {
        Self { conditions }
    }

    /// True when every requirement passes (an empty list always passes)
    pub fn requirements_met(
        &self,
        definition: &ComponentDefinition,
        instance: &ComponentInstance,
        ctx: &SequenceContext<'_>,
    ) -> bool {
        self.first_failure(definition, instance, ctx).is_none()
    }

    /// Reason the first failing requirement failed, if any
    pub fn first_failure(
        &self,
        definition: &ComponentDefinition,
        instance: &ComponentInstance,
        ctx: &SequenceContext<'_>,
    ) -> Option<String> {
        for requirement in &definition.requirements {
            match self.check(requirement, instance, ctx) {
                Ok(true) => {}
                Ok(false) => return Some(describe_failure(requirement)),
                Err(e) => {
                    // Broken custom conditions fail closed
                    tracing::warn!("{} ({} at position {})", e, definition.id, instance.position);
                    return Some(format!("custom condition errored: {}", e));
                }
            }
        }
        None
    }

    /// Evaluate a single requirement
    pub fn check(
        &self,
        requirement: &Requirement,
        instance: &ComponentInstance,
        ctx: &SequenceContext<'_>,
    ) -> Result<bool, EngineError> {
        let position = instance.position;

        let passed = match requirement {
            Requirement::Position { position: rule } => position_matches(*rule, position, ctx.len()),

            Requirement::AdjacentTag { tag, direction } => ctx
                .neighbors(position, *direction)
                .iter()
                .any(|n| n.definition.has_tag(*tag)),

            Requirement::AdjacentType {
                component_type,
                direction,
            } => ctx
                .neighbors(position, *direction)
                .iter()
                .any(|n| n.component_type() == *component_type),

            Requirement::Sandwich { previous, next } => {
                match (ctx.previous(position), ctx.next(position)) {
                    (Some(before), Some(after)) => before.matches(previous) && after.matches(next),
                    _ => false,
                }
            }

            Requirement::SequenceCount { criteria, minimum } => {
                ctx.count_matching(criteria) >= *minimum
            }

            Requirement::TagDiversity { minimum } => ctx.distinct_tags().len() >= *minimum,

            Requirement::GlobalPresence { criteria } => ctx.any_other_matching(position, criteria),

            Requirement::EvolutionStage { minimum } => instance.evolution_level >= *minimum,

            Requirement::Custom { condition } => {
                let predicate =
                    self.conditions
                        .get(condition)
                        .ok_or_else(|| EngineError::RequirementEvaluation {
                            component: instance.component_id.clone(),
                            reason: format!("condition '{}' is not registered", condition),
                        })?;
                let outcome = catch_unwind(AssertUnwindSafe(|| (**predicate)(instance, ctx)))
                    .unwrap_or_else(|panic| {
                        Err(format!("condition '{}' panicked: {}", condition, panic_reason(panic.as_ref())))
                    });
                outcome.map_err(|reason| EngineError::RequirementEvaluation {
                    component: instance.component_id.clone(),
                    reason,
                })?
            }
        };

        Ok(passed)
    }
}

/// Position rule against a 1-based position in a sequence of length `len`
pub fn position_matches(rule: PositionRule, position: usize, len: usize) -> bool {
    if position == 0 || position > len {
        return false;
    }
    match rule {
        PositionRule::First => position == 1,
        PositionRule::Second => position == 2,
        PositionRule::Fourth => len >= 2 && position == len - 1,
        PositionRule::Last => position == len,
        PositionRule::Middle => position >= 2 && position < len,
        PositionRule::Any => true,
    }
}

fn describe_failure(requirement: &Requirement) -> String {
    match requirement {
        Requirement::Position { position } => format!("needs position {:?}", position),
        Requirement::AdjacentTag { tag, direction } => {
            format!("needs a {:?} neighbor ({})", tag, direction_name(*direction))
        }
        Requirement::AdjacentType {
            component_type,
            direction,
        } => format!(
            "needs a {} neighbor ({})",
            component_type,
            direction_name(*direction)
        ),
        Requirement::Sandwich { .. } => "needs matching neighbors on both sides".to_string(),
        Requirement::SequenceCount { minimum, .. } => {
            format!("needs at least {} matching components", minimum)
        }
        Requirement::TagDiversity { minimum } => format!("needs {} distinct tags", minimum),
        Requirement::GlobalPresence { .. } => "needs a matching component elsewhere".to_string(),
        Requirement::EvolutionStage { minimum } => format!("needs evolution level {}", minimum),
        Requirement::Custom { condition } => format!("condition '{}' not met", condition),
    }
}

fn direction_name(direction: Direction) -> &'static str {
    match direction {
        Direction::Previous => "previous",
        Direction::Next => "next",
        Direction::Either => "either side",
    }
}
