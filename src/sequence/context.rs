//! Sequence context: one participant's compacted sequence for one evaluation
//!
//! Built fresh from the submitted slots every time a participant is
//! evaluated. Empty slots are dropped, so positions count only populated
//! components: a sequence submitted as `[_, A, _, B]` has A at position 1
//! and B at position 2.

use std::collections::BTreeSet;

use super::instance::{ComponentInstance, SlotSpec};
use super::ledger::{BonusLedger, BonusRecord};
use crate::catalog::schema::{ComponentDefinition, Criteria, Direction};
use crate::catalog::ComponentCatalog;
use crate::core::types::{ComponentType, Tag, MAX_SEQUENCE_LENGTH};

/// A populated position: the instance and the catalog entry it refers to
#[derive(Debug, Clone)]
pub struct ContextEntry<'c> {
    pub instance: ComponentInstance,
    pub definition: &'c ComponentDefinition,
}

impl ContextEntry<'_> {
    pub fn component_type(&self) -> ComponentType {
        self.definition.component_type
    }

    pub fn matches(&self, criteria: &Criteria) -> bool {
        criteria.matches(self.definition, self.instance.rarity)
    }
}

#[derive(Debug)]
pub struct SequenceContext<'c> {
    /// Populated entries in position order (index = position - 1)
    entries: Vec<ContextEntry<'c>>,
    /// Raw slot -> compacted position
    slot_positions: [Option<usize>; MAX_SEQUENCE_LENGTH + 1],
    ledger: BonusLedger,
    /// Damage of each activated damage dealer, by position
    outcomes: Vec<Option<f64>>,
    diagnostics: Vec<String>,
}

impl<'c> SequenceContext<'c> {
    /// Build a context from submitted slots. Slot `i` of the input is raw
    /// slot `i + 1`. Components unknown to the catalog are skipped with a
    /// diagnostic and take no position.
    pub fn build(catalog: &'c ComponentCatalog, slots: &[Option<SlotSpec>]) -> Self {
        let mut entries = Vec::with_capacity(slots.len().min(MAX_SEQUENCE_LENGTH));
        let mut slot_positions = [None; MAX_SEQUENCE_LENGTH + 1];
        let mut diagnostics = Vec::new();

        for (index, slot) in slots.iter().enumerate() {
            let raw_slot = index + 1;
            let Some(spec) = slot else {
                continue;
            };

            if raw_slot > MAX_SEQUENCE_LENGTH {
                diagnostics.push(format!(
                    "slot {} ('{}') is beyond the sequence limit and was ignored",
                    raw_slot, spec.component_id
                ));
                continue;
            }

            let definition = match catalog.lookup(&spec.component_id) {
                Ok(definition) => definition,
                Err(e) => {
                    tracing::warn!("Skipping slot {}: {}", raw_slot, e);
                    diagnostics.push(format!("slot {}: {}", raw_slot, e));
                    continue;
                }
            };

            let position = entries.len() + 1;
            slot_positions[raw_slot] = Some(position);
            entries.push(ContextEntry {
                instance: ComponentInstance {
                    component_id: spec.component_id.clone(),
                    slot: raw_slot,
                    position,
                    rarity: spec.rarity.unwrap_or(definition.rarity),
                    evolution_level: spec.evolution_level,
                },
                definition,
            });
        }

        let outcomes = vec![None; entries.len()];
        Self {
            entries,
            slot_positions,
            ledger: BonusLedger::new(),
            outcomes,
            diagnostics,
        }
    }

    /// Number of populated positions (N)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ContextEntry<'c>] {
        &self.entries
    }

    /// Entry at a 1-based position
    pub fn entry(&self, position: usize) -> Option<&ContextEntry<'c>> {
        position.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    /// Compacted position of a raw submitted slot
    pub fn position_of_slot(&self, slot: usize) -> Option<usize> {
        self.slot_positions.get(slot).copied().flatten()
    }

    pub fn previous(&self, position: usize) -> Option<&ContextEntry<'c>> {
        position.checked_sub(1).and_then(|p| self.entry(p))
    }

    pub fn next(&self, position: usize) -> Option<&ContextEntry<'c>> {
        self.entry(position + 1)
    }

    /// Neighbors in the given direction. A missing neighbor is simply absent.
    pub fn neighbors(&self, position: usize, direction: Direction) -> Vec<&ContextEntry<'c>> {
        let previous = match direction {
            Direction::Previous | Direction::Either => self.previous(position),
            Direction::Next => None,
        };
        let next = match direction {
            Direction::Next | Direction::Either => self.next(position),
            Direction::Previous => None,
        };
        previous.into_iter().chain(next).collect()
    }

    /// Every distinct tag carried by any component in the sequence
    pub fn distinct_tags(&self) -> BTreeSet<Tag> {
        self.entries
            .iter()
            .flat_map(|e| e.definition.tags.iter().copied())
            .collect()
    }

    /// Count of components (self included) matching the criteria
    pub fn count_matching(&self, criteria: &Criteria) -> usize {
        self.entries.iter().filter(|e| e.matches(criteria)).count()
    }

    /// Whether any component other than the one at `position` matches
    pub fn any_other_matching(&self, position: usize, criteria: &Criteria) -> bool {
        self.entries
            .iter()
            .any(|e| e.instance.position != position && e.matches(criteria))
    }

    pub fn count_of_type(&self, component_type: ComponentType) -> usize {
        self.entries
            .iter()
            .filter(|e| e.component_type() == component_type)
            .count()
    }

    pub fn contains_component(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.definition.id == id)
    }

    pub fn ledger(&self) -> &BonusLedger {
        &self.ledger
    }

    /// Append records emitted by an ability. Visible to every ability that
    /// runs afterwards in this evaluation. Records aimed at positions outside
    /// the sequence are dropped.
    pub fn commit(&mut self, records: Vec<BonusRecord>) {
        let len = self.entries.len();
        for record in records {
            if record.target == 0 || record.target > len {
                self.diagnostics.push(format!(
                    "dropped bonus from position {} to missing position {}",
                    record.source, record.target
                ));
                continue;
            }
            self.ledger.push(record);
        }
    }

    /// Record the damage an activated damage dealer produced
    pub fn record_outcome(&mut self, position: usize, damage: f64) {
        if let Some(slot) = position.checked_sub(1).and_then(|i| self.outcomes.get_mut(i)) {
            *slot = Some(damage);
        }
    }

    pub fn outcome_at(&self, position: usize) -> Option<f64> {
        position
            .checked_sub(1)
            .and_then(|i| self.outcomes.get(i))
            .copied()
            .flatten()
    }

    /// Nearest earlier position with a recorded outcome, and its damage
    pub fn last_outcome_before(&self, position: usize) -> Option<(usize, f64)> {
        (1..position)
            .rev()
            .find_map(|p| self.outcome_at(p).map(|damage| (p, damage)))
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn push_diagnostic(&mut self, message: String) {
        self.diagnostics.push(message);
    }

    pub(crate) fn take_diagnostics(&mut self) -> Vec<String> {
        std::mem::take(&mut self.diagnostics)
    }
}
