//! Ability execution
//!
//! Core and Artifact components run an Execute behavior and produce damage.
//! Modifier and Chain components run a ModifyWeb behavior and produce bonus
//! records for their siblings. Every behavior reads the whole context, but
//! writes only by returning records; the simulator commits them.
//!
//! Each formula below is literal. Several mix additive and multiplicative
//! terms in different orders, and they are not interchangeable.

use rand::Rng;
use std::collections::BTreeMap;

use crate::catalog::schema::{Ability, ComponentDefinition, Direction, ExecuteBehavior, WebBehavior};
use crate::core::types::{ComponentType, DamageType, Effect, EffectKind, Tag};
use crate::sequence::{BonusKind, BonusRecord, ComponentInstance, SequenceContext};

/// Ledger key for genesis charge contributed by other components
pub const GENESIS_CHARGE: &str = "genesis_charge";

/// Result of an Execute behavior
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DamageOutcome {
    pub damage: f64,
    pub damage_type: Option<DamageType>,
    pub critical: bool,
    pub effects: Vec<Effect>,
    /// Ability-specific telemetry
    pub aux: BTreeMap<String, f64>,
    pub emitted: Vec<BonusRecord>,
}

/// Result of a ModifyWeb behavior
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebOutcome {
    /// Distinct sibling positions that received a bonus
    pub touched: usize,
    pub aux: BTreeMap<String, f64>,
    pub emitted: Vec<BonusRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AbilityOutcome {
    Damage(DamageOutcome),
    WebMutation(WebOutcome),
}

impl AbilityOutcome {
    pub fn damage(&self) -> f64 {
        match self {
            AbilityOutcome::Damage(outcome) => outcome.damage,
            AbilityOutcome::WebMutation(_) => 0.0,
        }
    }

    /// Take the bonus records out of the outcome for committing
    pub fn take_emitted(&mut self) -> Vec<BonusRecord> {
        match self {
            AbilityOutcome::Damage(outcome) => std::mem::take(&mut outcome.emitted),
            AbilityOutcome::WebMutation(outcome) => std::mem::take(&mut outcome.emitted),
        }
    }
}

/// Bonuses the ledger holds for one target
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IncomingBonuses {
    pub damage_multiplier: f64,
    pub damage_additive: f64,
    pub effect_power: f64,
    pub crit_chance: f64,
    pub chain_resonance: f64,
}

impl IncomingBonuses {
    pub fn for_position(ctx: &SequenceContext<'_>, position: usize) -> Self {
        let ledger = ctx.ledger();
        Self {
            damage_multiplier: ledger.multiplier(position, &BonusKind::DamageMultiplier),
            damage_additive: ledger.additive(position, &BonusKind::DamageAdditive),
            effect_power: ledger.multiplier(position, &BonusKind::EffectPowerMultiplier),
            crit_chance: ledger.additive(position, &BonusKind::CritChance),
            chain_resonance: ledger.multiplier(position, &BonusKind::ChainResonance),
        }
    }
}

/// Run a component's ability
pub fn execute<R: Rng + ?Sized>(
    definition: &ComponentDefinition,
    instance: &ComponentInstance,
    ctx: &SequenceContext<'_>,
    rng: &mut R,
) -> AbilityOutcome {
    match definition.ability {
        Ability::Execute(behavior) => {
            AbilityOutcome::Damage(execute_damage(behavior, definition, instance, ctx, rng))
        }
        Ability::ModifyWeb(behavior) => {
            AbilityOutcome::WebMutation(modify_web(behavior, definition, instance, ctx))
        }
    }
}

fn execute_damage<R: Rng + ?Sized>(
    behavior: ExecuteBehavior,
    def: &ComponentDefinition,
    instance: &ComponentInstance,
    ctx: &SequenceContext<'_>,
    rng: &mut R,
) -> DamageOutcome {
    let position = instance.position;
    let rarity = instance.rarity_multiplier();
    let bonus = IncomingBonuses::for_position(ctx, position);
    let base = def.stat("base_damage", 0.0);
    let mut out = DamageOutcome::default();

    match behavior {
        // base * first_bonus * rarity * mult + add
        ExecuteBehavior::Vanguard => {
            let first_bonus = if position == 1 {
                def.stat("first_position_bonus", 1.5)
            } else {
                1.0
            };
            out.damage = base * first_bonus * rarity * bonus.damage_multiplier + bonus.damage_additive;
            out.damage_type = Some(DamageType::Physical);
            out.aux.insert("first_position_bonus".into(), first_bonus);
        }

        // (base * rarity + add) * mult * chain_resonance
        ExecuteBehavior::Ember => {
            out.damage = (base * rarity + bonus.damage_additive)
                * bonus.damage_multiplier
                * bonus.chain_resonance;
            out.damage_type = Some(DamageType::Fire);
            out.effects.push(Effect::new(
                EffectKind::Burn,
                def.stat("burn_power", 0.0) * bonus.effect_power,
                3,
            ));
            out.aux.insert("chain_resonance".into(), bonus.chain_resonance);
        }

        // base * rarity * mult * (1 + water_bonus * water_neighbors) + add
        ExecuteBehavior::Frost => {
            let water_neighbors = ctx
                .neighbors(position, Direction::Either)
                .iter()
                .filter(|n| n.definition.has_tag(Tag::Water))
                .count() as f64;
            let water_factor = 1.0 + def.stat("water_bonus", 0.0) * water_neighbors;
            out.damage = base * rarity * bonus.damage_multiplier * water_factor + bonus.damage_additive;
            out.damage_type = Some(DamageType::Frost);
            out.effects.push(Effect::new(
                EffectKind::Slow,
                def.stat("slow_power", 0.0) * bonus.effect_power,
                2,
            ));
            out.aux.insert("water_neighbors".into(), water_neighbors);
        }

        // base * rarity * mult + add, then crit
        ExecuteBehavior::Storm => {
            out.damage = base * rarity * bonus.damage_multiplier + bonus.damage_additive;
            out.damage_type = Some(DamageType::Lightning);
            out.effects.push(Effect::new(
                EffectKind::Shock,
                def.stat("shock_power", 0.0) * bonus.effect_power,
                1,
            ));
        }

        // echo_ratio * (damage of nearest earlier damage dealer) * rarity * mult
        ExecuteBehavior::Echo => {
            let echoed = ctx.last_outcome_before(position);
            let (echoed_position, echoed_damage) = echoed.unwrap_or((0, 0.0));
            out.damage =
                def.stat("echo_ratio", 0.5) * echoed_damage * rarity * bonus.damage_multiplier;
            out.damage_type = Some(DamageType::Arcane);
            out.aux.insert("echoed_position".into(), echoed_position as f64);
            out.aux.insert("echoed_damage".into(), echoed_damage);
        }

        // base * (1 + scaling * distinct_tags) * rarity * mult + add
        ExecuteBehavior::Prism => {
            let distinct = ctx.distinct_tags().len() as f64;
            out.damage = base
                * (1.0 + def.stat("diversity_scaling", 0.0) * distinct)
                * rarity
                * bonus.damage_multiplier
                + bonus.damage_additive;
            out.damage_type = Some(DamageType::Arcane);
            out.aux.insert("distinct_tags".into(), distinct);
        }

        // charge = evolution * per_level + artifacts + seeded charge
        // base * (1 + charge) * rarity * mult + add
        ExecuteBehavior::Genesis => {
            let seeded = ctx
                .ledger()
                .additive(position, &BonusKind::Custom(GENESIS_CHARGE.to_string()));
            let artifacts = ctx.count_of_type(ComponentType::Artifact) as f64;
            let charge = instance.evolution_level as f64 * def.stat("charge_per_level", 0.0)
                + artifacts
                + seeded;
            out.damage = base * (1.0 + charge) * rarity * bonus.damage_multiplier + bonus.damage_additive;
            out.damage_type = Some(DamageType::Arcane);
            out.effects.push(Effect::new(EffectKind::Empower, charge * bonus.effect_power, 1));
            out.aux.insert("charge".into(), charge);
        }

        // (base * rarity + add) * mult; stokes the next component
        ExecuteBehavior::Kindling => {
            out.damage = (base * rarity + bonus.damage_additive) * bonus.damage_multiplier;
            out.damage_type = Some(DamageType::Fire);
            out.effects.push(Effect::new(
                EffectKind::Burn,
                def.stat("burn_power", 0.0) * bonus.effect_power,
                2,
            ));
            if let Some(next) = ctx.next(position) {
                if next.component_type().deals_damage() {
                    out.emitted.push(BonusRecord::add(
                        position,
                        next.instance.position,
                        BonusKind::DamageAdditive,
                        def.stat("kindle_amount", 0.0),
                    ));
                }
            }
        }

        // base * rarity * (1 + per_core * other_cores) * mult + add
        ExecuteBehavior::Relic => {
            let cores = ctx
                .entries()
                .iter()
                .filter(|e| e.instance.position != position)
                .filter(|e| e.component_type() == ComponentType::Core)
                .count() as f64;
            out.damage = base * rarity * (1.0 + def.stat("per_core_bonus", 0.0) * cores)
                * bonus.damage_multiplier
                + bonus.damage_additive;
            out.damage_type = Some(DamageType::Physical);
            out.aux.insert("watched_cores".into(), cores);
        }

        // base * rarity * mult + add
        ExecuteBehavior::VoidShard => {
            out.damage = base * rarity * bonus.damage_multiplier + bonus.damage_additive;
            out.damage_type = Some(DamageType::Void);
            out.effects.push(Effect::new(
                EffectKind::Weaken,
                def.stat("weaken_power", 0.0) * bonus.effect_power,
                2,
            ));
        }
    }

    // Cores can crit; echoes copy rather than strike
    if def.component_type == ComponentType::Core && behavior != ExecuteBehavior::Echo {
        let chance = def.stat("crit_chance", 0.0) + bonus.crit_chance;
        if chance > 0.0 && rng.gen::<f64>() < chance {
            out.critical = true;
            out.damage *= def.stat("crit_multiplier", 1.5);
        }
        if chance > 0.0 {
            out.aux.insert("crit_chance".into(), chance);
        }
    }

    out.damage = out.damage.max(0.0);
    out
}

fn modify_web(
    behavior: WebBehavior,
    def: &ComponentDefinition,
    instance: &ComponentInstance,
    ctx: &SequenceContext<'_>,
) -> WebOutcome {
    let position = instance.position;
    let mut out = WebOutcome::default();

    match behavior {
        // Mul DamageMultiplier on each adjacent damage dealer
        WebBehavior::Amplify => {
            let amount = def.stat("amplify", 1.0);
            for neighbor in ctx.neighbors(position, Direction::Either) {
                if neighbor.component_type().deals_damage() {
                    out.emitted.push(BonusRecord::mul(
                        position,
                        neighbor.instance.position,
                        BonusKind::DamageMultiplier,
                        amount,
                    ));
                }
            }
        }

        // Add DamageAdditive (catalyst_damage * rarity) on the next component
        WebBehavior::Catalyze => {
            let amount = def.stat("catalyst_damage", 0.0) * instance.rarity_multiplier();
            if let Some(next) = ctx.next(position) {
                out.emitted.push(BonusRecord::add(
                    position,
                    next.instance.position,
                    BonusKind::DamageAdditive,
                    amount,
                ));
            }
        }

        // Mul EffectPowerMultiplier on every other component sharing a tag
        WebBehavior::Resonate => {
            let amount = def.stat("effect_power", 1.0);
            for entry in ctx.entries() {
                if entry.instance.position == position {
                    continue;
                }
                if entry.definition.tags.iter().any(|t| def.has_tag(*t)) {
                    out.emitted.push(BonusRecord::mul(
                        position,
                        entry.instance.position,
                        BonusKind::EffectPowerMultiplier,
                        amount,
                    ));
                }
            }
        }

        // Add CritChance on every Core
        WebBehavior::Overclock => {
            let amount = def.stat("crit_bonus", 0.0);
            for entry in ctx.entries() {
                if entry.component_type() == ComponentType::Core {
                    out.emitted.push(BonusRecord::add(
                        position,
                        entry.instance.position,
                        BonusKind::CritChance,
                        amount,
                    ));
                }
            }
        }

        // Mul ChainResonance on both neighbors
        WebBehavior::ChainLink => {
            let amount = def.stat("link_bonus", 1.0);
            for neighbor in ctx.neighbors(position, Direction::Either) {
                out.emitted.push(BonusRecord::mul(
                    position,
                    neighbor.instance.position,
                    BonusKind::ChainResonance,
                    amount,
                ));
            }
            out.aux.insert("link_bonus".into(), amount);
        }

        // Mul DamageMultiplier on every damage dealer
        WebBehavior::Conduit => {
            let amount = def.stat("conduit_bonus", 1.0);
            for entry in ctx.entries() {
                if entry.component_type().deals_damage() {
                    out.emitted.push(BonusRecord::mul(
                        position,
                        entry.instance.position,
                        BonusKind::DamageMultiplier,
                        amount,
                    ));
                }
            }
        }

        // Add genesis charge on every Core
        WebBehavior::Seed => {
            let amount = def.stat("seed_charge", 0.0);
            for entry in ctx.entries() {
                if entry.component_type() == ComponentType::Core {
                    out.emitted.push(BonusRecord::add(
                        position,
                        entry.instance.position,
                        BonusKind::Custom(GENESIS_CHARGE.to_string()),
                        amount,
                    ));
                }
            }
        }
    }

    let mut targets: Vec<usize> = out.emitted.iter().map(|r| r.target).collect();
    targets.sort_unstable();
    targets.dedup();
    out.touched = targets.len();
    out
}
