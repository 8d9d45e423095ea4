//! Evaluation service - participant tables and batched tick processing
//!
//! Holds the three shared tables (configurations, results, performance),
//! each behind one coarse lock taken only for insert, remove or snapshot.
//! Simulation itself runs on a snapshot and touches no shared state.
//!
//! Processing order per tick:
//! snapshot -> batches (sleep between) -> rank -> store -> publish -> global stats

use ahash::AHashMap;
use ordered_float::OrderedFloat;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Reverse;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::messages::{
    FinalResult, LiveUpdate, OutboundMessage, ProgressUpdate, TickSummary, TopPerformer,
};
use super::ownership::{AllowAll, OwnershipCheck};
use crate::catalog::ComponentCatalog;
use crate::core::config::EngineConfig;
use crate::core::error::ValidationError;
use crate::core::types::{ParticipantId, Tick, MAX_SEQUENCE_LENGTH};
use crate::scheduler::clock::Phase;
use crate::sequence::SlotSpec;
use crate::synergy::{SequenceSimulator, SimulationReport};

/// A participant's submitted sequence
#[derive(Debug, Clone, PartialEq)]
pub struct StoredConfiguration {
    pub slots: Vec<Option<SlotSpec>>,
    pub config_hash: String,
}

/// What the scheduler hands over when evaluation starts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationRequest {
    pub tick: Tick,
    pub hourly_event: bool,
    /// Snapshotted at dispatch; applied to every participant this tick
    pub damage_multiplier: f64,
}

impl EvaluationRequest {
    pub fn regular(tick: Tick) -> Self {
        Self {
            tick,
            hourly_event: false,
            damage_multiplier: 1.0,
        }
    }

    pub fn hourly(tick: Tick, damage_multiplier: f64) -> Self {
        Self {
            tick,
            hourly_event: true,
            damage_multiplier,
        }
    }
}

/// Published outcome for one participant
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantResult {
    pub participant: ParticipantId,
    pub tick: Tick,
    pub rank: usize,
    pub base_damage: f64,
    pub total_damage: f64,
    pub damage_multiplier: f64,
    pub is_hourly_event: bool,
    pub report: SimulationReport,
}

/// Running per-participant record
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
    pub ticks_participated: u64,
    pub best_tick_damage: f64,
    pub cumulative_damage: f64,
    pub last_rank: Option<usize>,
}

impl PerformanceStats {
    pub fn average_damage(&self) -> f64 {
        if self.ticks_participated == 0 {
            0.0
        } else {
            self.cumulative_damage / self.ticks_participated as f64
        }
    }

    fn record(&mut self, damage: f64, rank: usize) {
        self.ticks_participated += 1;
        self.cumulative_damage += damage;
        self.best_tick_damage = self.best_tick_damage.max(damage);
        self.last_rank = Some(rank);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStats {
    pub highest_tick_damage: f64,
    pub ticks_processed: u64,
}

/// Per-participant RNG seed for one tick
pub fn participant_seed(seed: u64, tick: Tick, participant: ParticipantId) -> u64 {
    let mut value = seed ^ tick.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    value ^= participant.0.rotate_left(29);
    value = (value ^ (value >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    value = (value ^ (value >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    value ^ (value >> 31)
}

fn simulate_participant(
    catalog: &ComponentCatalog,
    seed: u64,
    participant: ParticipantId,
    slots: &[Option<SlotSpec>],
    tick: Tick,
) -> SimulationReport {
    let mut rng = ChaCha8Rng::seed_from_u64(participant_seed(seed, tick, participant));
    let report = SequenceSimulator::new(catalog).simulate(slots, &mut rng);
    for diagnostic in &report.diagnostics {
        tracing::warn!("{}: {}", participant, diagnostic);
    }
    tracing::debug!(
        "{} dealt {:.2} with {} active components",
        participant,
        report.total_damage,
        report.active_components
    );
    report
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct EvaluationService {
    catalog: Arc<ComponentCatalog>,
    config: EngineConfig,
    ownership: Arc<dyn OwnershipCheck>,
    configurations: Mutex<AHashMap<ParticipantId, StoredConfiguration>>,
    results: Mutex<AHashMap<ParticipantId, ParticipantResult>>,
    performance: Mutex<AHashMap<ParticipantId, PerformanceStats>>,
    global: Mutex<GlobalStats>,
    events: broadcast::Sender<OutboundMessage>,
}

impl std::fmt::Debug for EvaluationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationService")
            .field("catalog_size", &self.catalog.len())
            .field("participants", &self.participant_count())
            .finish()
    }
}

impl EvaluationService {
    /// Service with no ownership enforcement collaborator (everything owned)
    pub fn new(catalog: Arc<ComponentCatalog>, config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(config.broadcast_capacity.max(1));
        Self {
            catalog,
            config,
            ownership: Arc::new(AllowAll),
            configurations: Mutex::new(AHashMap::new()),
            results: Mutex::new(AHashMap::new()),
            performance: Mutex::new(AHashMap::new()),
            global: Mutex::new(GlobalStats::default()),
            events,
        }
    }

    pub fn with_ownership(mut self, ownership: Arc<dyn OwnershipCheck>) -> Self {
        self.ownership = ownership;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &ComponentCatalog {
        &self.catalog
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.events.subscribe()
    }

    /// Sender shared with the scheduler so every message goes out on one channel
    pub fn sender(&self) -> broadcast::Sender<OutboundMessage> {
        self.events.clone()
    }

    fn publish(&self, message: OutboundMessage) {
        // No subscribers is fine
        let _ = self.events.send(message);
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    /// Check a submission without storing it
    pub fn validate_configuration(
        &self,
        participant: ParticipantId,
        slots: &[Option<SlotSpec>],
    ) -> Result<(), ValidationError> {
        if slots.len() > MAX_SEQUENCE_LENGTH {
            return Err(ValidationError::SequenceTooLong {
                len: slots.len(),
                max: MAX_SEQUENCE_LENGTH,
            });
        }

        for (index, slot) in slots.iter().enumerate() {
            let slot_number = index + 1;
            let Some(spec) = slot else {
                if !self.config.allow_empty_slots {
                    return Err(ValidationError::EmptySlotNotAllowed { slot: slot_number });
                }
                continue;
            };

            if !self.catalog.contains(&spec.component_id) {
                return Err(ValidationError::UnknownComponent {
                    slot: slot_number,
                    id: spec.component_id.clone(),
                });
            }

            if spec.evolution_level > self.config.max_evolution_level {
                return Err(ValidationError::InvalidEvolution {
                    slot: slot_number,
                    level: spec.evolution_level,
                    max: self.config.max_evolution_level,
                });
            }

            if self.config.enforce_ownership && !self.ownership.owns(participant, &spec.component_id) {
                return Err(ValidationError::NotOwned {
                    participant,
                    slot: slot_number,
                    id: spec.component_id.clone(),
                });
            }
        }

        let populated = slots.iter().any(Option::is_some);
        if !populated && !(self.config.allow_empty_slots && !slots.is_empty()) {
            return Err(ValidationError::EmptySequence);
        }

        Ok(())
    }

    /// Validate and store a participant's sequence. Resubmitting the stored
    /// hash is accepted without touching the table.
    pub fn submit_configuration(
        &self,
        participant: ParticipantId,
        slots: Vec<Option<SlotSpec>>,
        config_hash: impl Into<String>,
    ) -> Result<(), ValidationError> {
        let config_hash = config_hash.into();

        if lock(&self.configurations)
            .get(&participant)
            .is_some_and(|stored| stored.config_hash == config_hash)
        {
            tracing::debug!("{} resubmitted configuration {}", participant, config_hash);
            return Ok(());
        }

        if let Err(e) = self.validate_configuration(participant, &slots) {
            tracing::debug!("Rejected configuration from {}: {}", participant, e);
            return Err(e);
        }

        lock(&self.configurations).insert(participant, StoredConfiguration { slots, config_hash });
        tracing::debug!("Stored configuration for {}", participant);
        Ok(())
    }

    /// Remove every trace of a participant. Returns whether anything was held.
    pub fn participant_departure(&self, participant: ParticipantId) -> bool {
        let had_config = lock(&self.configurations).remove(&participant).is_some();
        let had_result = lock(&self.results).remove(&participant).is_some();
        let had_stats = lock(&self.performance).remove(&participant).is_some();
        tracing::debug!("{} departed", participant);
        had_config || had_result || had_stats
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn participant_count(&self) -> usize {
        lock(&self.configurations).len()
    }

    pub fn configuration(&self, participant: ParticipantId) -> Option<StoredConfiguration> {
        lock(&self.configurations).get(&participant).cloned()
    }

    pub fn result(&self, participant: ParticipantId) -> Option<ParticipantResult> {
        lock(&self.results).get(&participant).cloned()
    }

    /// Current results ordered by rank
    pub fn results_snapshot(&self) -> Vec<ParticipantResult> {
        let mut results: Vec<_> = lock(&self.results).values().cloned().collect();
        results.sort_by_key(|r| r.rank);
        results
    }

    pub fn performance(&self, participant: ParticipantId) -> Option<PerformanceStats> {
        lock(&self.performance).get(&participant).cloned()
    }

    pub fn global_stats(&self) -> GlobalStats {
        *lock(&self.global)
    }

    // ------------------------------------------------------------------
    // Processing
    // ------------------------------------------------------------------

    /// Simulate one participant. Deterministic for a given seed, tick and id.
    pub fn evaluate_participant(
        &self,
        participant: ParticipantId,
        slots: &[Option<SlotSpec>],
        tick: Tick,
    ) -> SimulationReport {
        simulate_participant(&self.catalog, self.config.rng_seed, participant, slots, tick)
    }

    /// Fan a batch out over rayon on the blocking pool, off the async workers
    async fn evaluate_parallel(
        &self,
        batch: &[(ParticipantId, StoredConfiguration)],
        tick: Tick,
    ) -> Vec<(ParticipantId, SimulationReport)> {
        let catalog = Arc::clone(&self.catalog);
        let seed = self.config.rng_seed;
        let batch = batch.to_vec();
        let task = tokio::task::spawn_blocking(move || {
            batch
                .par_iter()
                .map(|(id, stored)| (*id, simulate_participant(&catalog, seed, *id, &stored.slots, tick)))
                .collect::<Vec<_>>()
        });
        match task.await {
            Ok(reports) => reports,
            Err(e) => {
                tracing::error!("Tick {}: parallel batch failed: {}", tick, e);
                Vec::new()
            }
        }
    }

    /// Evaluate every stored configuration for one tick and publish results
    pub async fn process_tick(&self, request: EvaluationRequest) -> TickSummary {
        let started = Instant::now();
        let deadline = started + self.config.evaluation_timeout();

        let mut snapshot: Vec<(ParticipantId, StoredConfiguration)> = lock(&self.configurations)
            .iter()
            .map(|(id, stored)| (*id, stored.clone()))
            .collect();
        snapshot.sort_by_key(|(id, _)| *id);

        if snapshot.is_empty() {
            tracing::info!("Tick {}: no participants", request.tick);
            lock(&self.results).clear();
            lock(&self.global).ticks_processed += 1;
            let summary = TickSummary {
                tick: request.tick,
                ..TickSummary::default()
            };
            self.publish(OutboundMessage::TickSummary(summary.clone()));
            return summary;
        }

        let total = snapshot.len();
        let batch_size = self.config.batch_size.max(1);
        let mut computed: Vec<(ParticipantId, SimulationReport)> = Vec::with_capacity(total);
        let mut timed_out = false;
        let mut last_progress: Option<Instant> = None;

        for (batch_index, batch) in snapshot.chunks(batch_size).enumerate() {
            if batch_index > 0 {
                tokio::time::sleep(self.config.inter_batch_delay()).await;
            }
            if Instant::now() >= deadline {
                timed_out = true;
                break;
            }

            let now = Instant::now();
            if last_progress.map_or(true, |at| now.duration_since(at) >= self.config.progress_interval()) {
                last_progress = Some(now);
                self.publish(OutboundMessage::Progress(ProgressUpdate {
                    phase: Phase::Evaluating,
                    progress: computed.len() as f64 / total as f64,
                    currently_processing: batch.len(),
                }));
            }

            let reports: Vec<(ParticipantId, SimulationReport)> =
                if batch.len() >= self.config.parallel_threshold {
                    self.evaluate_parallel(batch, request.tick).await
                } else {
                    let mut reports = Vec::with_capacity(batch.len());
                    for (id, stored) in batch {
                        if Instant::now() >= deadline {
                            timed_out = true;
                            break;
                        }
                        reports.push((*id, self.evaluate_participant(*id, &stored.slots, request.tick)));
                    }
                    reports
                };

            for (id, report) in &reports {
                self.publish(OutboundMessage::LiveUpdate(LiveUpdate {
                    participant_id: *id,
                    total_damage_so_far: report.total_damage * request.damage_multiplier,
                    active_component_count: report.active_components,
                    best_component: report.best_component().map(|c| c.component_id.clone()),
                }));
            }
            computed.extend(reports);

            if timed_out {
                break;
            }
        }

        if timed_out {
            tracing::warn!(
                "Tick {}: evaluation timed out after {:?}, publishing {}/{} results",
                request.tick,
                started.elapsed(),
                computed.len(),
                total
            );
        }

        self.publish(OutboundMessage::Progress(ProgressUpdate {
            phase: Phase::Evaluating,
            progress: computed.len() as f64 / total as f64,
            currently_processing: 0,
        }));

        let summary = self.publish_results(request, computed, timed_out);
        tracing::info!(
            "Tick {}: {} participants, total {:.2}, top {:.2} ({:?})",
            summary.tick,
            summary.player_count,
            summary.total_damage,
            summary.top_damage,
            started.elapsed()
        );
        summary
    }

    /// Rank, store and broadcast computed reports, then fold in global stats
    fn publish_results(
        &self,
        request: EvaluationRequest,
        mut computed: Vec<(ParticipantId, SimulationReport)>,
        timed_out: bool,
    ) -> TickSummary {
        computed.sort_by_key(|(id, report)| (Reverse(OrderedFloat(report.total_damage)), *id));

        let ranked: Vec<ParticipantResult> = computed
            .into_iter()
            .enumerate()
            .map(|(index, (participant, report))| ParticipantResult {
                participant,
                tick: request.tick,
                rank: index + 1,
                base_damage: report.total_damage,
                total_damage: report.total_damage * request.damage_multiplier,
                damage_multiplier: request.damage_multiplier,
                is_hourly_event: request.hourly_event,
                report,
            })
            .collect();

        // Participants who left mid-tick still get their result published,
        // but nothing is stored for them
        {
            let configurations = lock(&self.configurations);
            let mut results = lock(&self.results);
            let mut performance = lock(&self.performance);
            results.clear();
            for result in &ranked {
                if !configurations.contains_key(&result.participant) {
                    continue;
                }
                performance
                    .entry(result.participant)
                    .or_default()
                    .record(result.total_damage, result.rank);
                results.insert(result.participant, result.clone());
            }
        }

        for result in &ranked {
            self.publish(OutboundMessage::FinalResult(FinalResult {
                participant_id: result.participant,
                tick: result.tick,
                total_damage: result.total_damage,
                base_damage: result.base_damage,
                rank: result.rank,
                active_components: result.report.active_components,
                component_breakdown: result.report.components.clone(),
                is_hourly_event: result.is_hourly_event,
                damage_multiplier: result.damage_multiplier,
            }));
        }

        let player_count = ranked.len();
        let total_damage: f64 = ranked.iter().map(|r| r.total_damage).sum();
        let top_damage = ranked.first().map_or(0.0, |r| r.total_damage);
        let summary = TickSummary {
            tick: request.tick,
            total_damage,
            player_count,
            average_damage: if player_count == 0 {
                0.0
            } else {
                total_damage / player_count as f64
            },
            top_damage,
            top_performers: ranked
                .iter()
                .take(self.config.top_performers)
                .map(|r| TopPerformer {
                    participant_id: r.participant,
                    total_damage: r.total_damage,
                    rank: r.rank,
                })
                .collect(),
            timed_out,
        };
        self.publish(OutboundMessage::TickSummary(summary.clone()));

        let mut global = lock(&self.global);
        global.ticks_processed += 1;
        global.highest_tick_damage = global.highest_tick_damage.max(top_damage);

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::ownership::InventoryOwnership;

    fn service(config: EngineConfig) -> EvaluationService {
        let catalog = Arc::new(ComponentCatalog::builtin().expect("builtin catalog"));
        EvaluationService::new(catalog, config)
    }

    fn slots(ids: &[&str]) -> Vec<Option<SlotSpec>> {
        ids.iter().map(|id| Some(SlotSpec::new(*id))).collect()
    }

    #[test]
    fn test_seed_mixing_varies_by_input() {
        let base = participant_seed(1, 1, ParticipantId(1));
        assert_eq!(base, participant_seed(1, 1, ParticipantId(1)));
        assert_ne!(base, participant_seed(1, 2, ParticipantId(1)));
        assert_ne!(base, participant_seed(1, 1, ParticipantId(2)));
        assert_ne!(base, participant_seed(2, 1, ParticipantId(1)));
    }

    #[test]
    fn test_validation_order() {
        let service = service(EngineConfig::default());
        let p = ParticipantId(1);

        let too_long = slots(&["ember_core"; 6]);
        assert_eq!(
            service.validate_configuration(p, &too_long),
            Err(ValidationError::SequenceTooLong { len: 6, max: 5 })
        );
        assert_eq!(
            service.validate_configuration(p, &slots(&["ember_core", "nope"])),
            Err(ValidationError::UnknownComponent { slot: 2, id: "nope".into() })
        );
        assert_eq!(
            service.validate_configuration(p, &[Some(SlotSpec::new("genesis_core").with_evolution(11))]),
            Err(ValidationError::InvalidEvolution { slot: 1, level: 11, max: 10 })
        );
        assert_eq!(service.validate_configuration(p, &[]), Err(ValidationError::EmptySequence));
        assert!(service.validate_configuration(p, &[None, None]).is_ok());
    }

    #[test]
    fn test_empty_slots_can_be_forbidden() {
        let service = service(EngineConfig {
            allow_empty_slots: false,
            ..EngineConfig::default()
        });
        let submission = vec![Some(SlotSpec::new("ember_core")), None];
        assert_eq!(
            service.validate_configuration(ParticipantId(1), &submission),
            Err(ValidationError::EmptySlotNotAllowed { slot: 2 })
        );
    }

    #[test]
    fn test_ownership_enforced() {
        let inventory = Arc::new(InventoryOwnership::new());
        inventory.grant(ParticipantId(1), "ember_core");
        let service = service(EngineConfig::default()).with_ownership(inventory.clone());

        assert!(service
            .submit_configuration(ParticipantId(1), slots(&["ember_core"]), "a")
            .is_ok());
        assert!(matches!(
            service.submit_configuration(ParticipantId(2), slots(&["ember_core"]), "a"),
            Err(ValidationError::NotOwned { slot: 1, .. })
        ));
        assert_eq!(service.participant_count(), 1);
    }

    #[test]
    fn test_resubmitting_same_hash_is_noop() {
        let service = service(EngineConfig::default());
        let p = ParticipantId(1);
        service.submit_configuration(p, slots(&["ember_core"]), "h1").unwrap();
        // same hash, different content: kept as stored
        service.submit_configuration(p, slots(&["frost_core"]), "h1").unwrap();
        assert_eq!(service.configuration(p).unwrap().slots, slots(&["ember_core"]));

        service.submit_configuration(p, slots(&["frost_core"]), "h2").unwrap();
        assert_eq!(service.configuration(p).unwrap().slots, slots(&["frost_core"]));
    }

    #[test]
    fn test_rejected_submission_not_stored() {
        let service = service(EngineConfig::default());
        assert!(service
            .submit_configuration(ParticipantId(1), slots(&["nope"]), "h")
            .is_err());
        assert!(service.configuration(ParticipantId(1)).is_none());
    }

    #[test]
    fn test_evaluate_participant_is_reproducible() {
        let service = service(EngineConfig::default());
        let submission = slots(&["overclock", "storm_core", "ember_core"]);
        let a = service.evaluate_participant(ParticipantId(3), &submission, 9);
        let b = service.evaluate_participant(ParticipantId(3), &submission, 9);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_empty_tick_short_circuits() {
        let service = service(EngineConfig::default());
        let summary = service.process_tick(EvaluationRequest::regular(1)).await;
        assert_eq!(summary.player_count, 0);
        assert_eq!(summary.total_damage, 0.0);
        assert_eq!(service.global_stats().ticks_processed, 1);
    }

    #[tokio::test]
    async fn test_ranking_and_performance() {
        let service = service(EngineConfig::default());
        service.submit_configuration(ParticipantId(1), slots(&["ember_core"]), "a").unwrap();
        service.submit_configuration(ParticipantId(2), slots(&["vanguard_core"]), "b").unwrap();
        service.submit_configuration(ParticipantId(3), slots(&["ember_core"]), "c").unwrap();

        let summary = service.process_tick(EvaluationRequest::regular(1)).await;
        assert_eq!(summary.player_count, 3);
        assert!((summary.total_damage - 310.0).abs() < 1e-9);
        assert_eq!(summary.top_performers[0].participant_id, ParticipantId(2));
        // tie broken by participant id
        assert_eq!(summary.top_performers[1].participant_id, ParticipantId(1));
        assert_eq!(summary.top_performers[2].participant_id, ParticipantId(3));

        let stats = service.performance(ParticipantId(3)).unwrap();
        assert_eq!(stats.ticks_participated, 1);
        assert_eq!(stats.last_rank, Some(3));
        assert_eq!(service.global_stats().highest_tick_damage, 150.0);
        assert_eq!(service.results_snapshot()[0].participant, ParticipantId(2));
    }

    #[tokio::test]
    async fn test_departure_clears_tables() {
        let service = service(EngineConfig::default());
        let p = ParticipantId(1);
        service.submit_configuration(p, slots(&["ember_core"]), "a").unwrap();
        service.process_tick(EvaluationRequest::regular(1)).await;
        assert!(service.result(p).is_some());
        assert!(service.performance(p).is_some());

        assert!(service.participant_departure(p));
        assert!(service.configuration(p).is_none());
        assert!(service.result(p).is_none());
        assert!(service.performance(p).is_none());
        assert!(!service.participant_departure(p));
    }
}
