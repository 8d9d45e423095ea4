//! Bonus ledger: the record of every bonus one component wrote onto another.
//!
//! Abilities never hold mutable references into their siblings. They emit
//! `BonusRecord`s, the simulator appends them here, and later abilities read
//! their own incoming bonuses back through `multiplier` and `additive`.

use serde::Serialize;

/// What a bonus applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BonusKind {
    DamageMultiplier,
    DamageAdditive,
    EffectPowerMultiplier,
    CritChance,
    ChainResonance,
    /// Escape hatch for bespoke mythical-tier mechanics
    Custom(String),
}

/// How a bonus composes with others of the same kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BonusOp {
    /// Summed with other `Add` records
    Add,
    /// Multiplied with other `Mul` records
    Mul,
}

/// One bonus written by `source` onto `target` (both compacted positions)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusRecord {
    pub source: usize,
    pub target: usize,
    pub kind: BonusKind,
    pub op: BonusOp,
    pub value: f64,
}

impl BonusRecord {
    pub fn mul(source: usize, target: usize, kind: BonusKind, value: f64) -> Self {
        Self {
            source,
            target,
            kind,
            op: BonusOp::Mul,
            value,
        }
    }

    pub fn add(source: usize, target: usize, kind: BonusKind, value: f64) -> Self {
        Self {
            source,
            target,
            kind,
            op: BonusOp::Add,
            value,
        }
    }
}

/// Append-only log of bonus records for one evaluation
#[derive(Debug, Clone, Default)]
pub struct BonusLedger {
    records: Vec<BonusRecord>,
}

impl BonusLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: BonusRecord) {
        self.records.push(record);
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = BonusRecord>) {
        self.records.extend(records);
    }

    pub fn records(&self) -> &[BonusRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn matching<'a>(
        &'a self,
        target: usize,
        kind: &'a BonusKind,
        op: BonusOp,
    ) -> impl Iterator<Item = &'a BonusRecord> + 'a {
        self.records
            .iter()
            .filter(move |r| r.target == target && &r.kind == kind && r.op == op)
    }

    /// Product of all `Mul` records of `kind` on `target` (1.0 if none)
    pub fn multiplier(&self, target: usize, kind: &BonusKind) -> f64 {
        self.matching(target, kind, BonusOp::Mul)
            .map(|r| r.value)
            .product()
    }

    /// Sum of all `Add` records of `kind` on `target` (0.0 if none)
    pub fn additive(&self, target: usize, kind: &BonusKind) -> f64 {
        self.matching(target, kind, BonusOp::Add)
            .map(|r| r.value)
            .sum()
    }

    /// Records written by one source
    pub fn written_by(&self, source: usize) -> impl Iterator<Item = &BonusRecord> + '_ {
        self.records.iter().filter(move |r| r.source == source)
    }

    /// Records received by one target
    pub fn received_by(&self, target: usize) -> impl Iterator<Item = &BonusRecord> + '_ {
        self.records.iter().filter(move |r| r.target == target)
    }
}
