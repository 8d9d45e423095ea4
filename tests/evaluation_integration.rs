//! Integration tests for the evaluation service: submissions, departures,
//! batched processing and published messages

use std::sync::Arc;

use synergy_arena::catalog::{ComponentCatalog, ConditionRegistry};
use synergy_arena::core::config::EngineConfig;
use synergy_arena::core::error::ValidationError;
use synergy_arena::core::types::ParticipantId;
use synergy_arena::evaluation::{
    EvaluationRequest, EvaluationService, InventoryOwnership, OutboundMessage,
};
use synergy_arena::sequence::SlotSpec;

fn service(config: EngineConfig) -> EvaluationService {
    let catalog = Arc::new(ComponentCatalog::builtin().expect("builtin catalog"));
    EvaluationService::new(catalog, config)
}

fn ids(ids: &[&str]) -> Vec<Option<SlotSpec>> {
    ids.iter().map(|id| Some(SlotSpec::new(*id))).collect()
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<OutboundMessage>) -> Vec<OutboundMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

#[test]
fn test_submission_rejections() {
    let service = service(EngineConfig::default());
    let p = ParticipantId(1);

    let err = service
        .submit_configuration(p, ids(&["ember_core"; 6]), "too-long")
        .unwrap_err();
    assert_eq!(err, ValidationError::SequenceTooLong { len: 6, max: 5 });

    let err = service
        .submit_configuration(p, ids(&["ember_core", "not_a_component"]), "unknown")
        .unwrap_err();
    assert!(matches!(err, ValidationError::UnknownComponent { slot: 2, .. }));

    assert!(service.configuration(p).is_none());
    assert_eq!(service.participant_count(), 0);
}

#[test]
fn test_ownership_rejection_names_slot() {
    let inventory = Arc::new(InventoryOwnership::new());
    inventory.grant(ParticipantId(1), "ember_core");
    let service = service(EngineConfig::default()).with_ownership(inventory);

    let err = service
        .submit_configuration(ParticipantId(1), ids(&["ember_core", "amplifier"]), "x")
        .unwrap_err();
    assert_eq!(
        err,
        ValidationError::NotOwned {
            participant: ParticipantId(1),
            slot: 2,
            id: "amplifier".into()
        }
    );

    let relaxed = EngineConfig {
        enforce_ownership: false,
        ..EngineConfig::default()
    };
    let inventory = Arc::new(InventoryOwnership::new());
    let service = self::service(relaxed).with_ownership(inventory);
    assert!(service
        .submit_configuration(ParticipantId(1), ids(&["amplifier"]), "x")
        .is_ok());
}

#[tokio::test]
async fn test_hourly_multiplier_is_exact() {
    let service = service(EngineConfig::default());
    service
        .submit_configuration(ParticipantId(1), ids(&["ember_core", "chain_link", "frost_core"]), "a")
        .unwrap();
    let mut rx = service.subscribe();

    let summary = service.process_tick(EvaluationRequest::hourly(7, 100.0)).await;

    let finals: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|m| match m {
            OutboundMessage::FinalResult(result) => Some(result),
            _ => None,
        })
        .collect();
    assert_eq!(finals.len(), 1);
    let result = &finals[0];
    assert!(result.is_hourly_event);
    assert_eq!(result.damage_multiplier, 100.0);
    assert!(result.base_damage > 0.0);
    assert_eq!(result.total_damage, result.base_damage * 100.0);
    assert_eq!(summary.total_damage, result.total_damage);

    let stored = service.result(ParticipantId(1)).unwrap();
    assert_eq!(stored.tick, 7);
    assert_eq!(stored.total_damage, stored.base_damage * 100.0);
}

#[tokio::test]
async fn test_message_order_for_one_tick() {
    let service = service(EngineConfig::default());
    service.submit_configuration(ParticipantId(1), ids(&["ember_core"]), "a").unwrap();
    service.submit_configuration(ParticipantId(2), ids(&["vanguard_core"]), "b").unwrap();
    let mut rx = service.subscribe();

    service.process_tick(EvaluationRequest::regular(1)).await;
    let messages = drain(&mut rx);

    let kinds: Vec<&str> = messages
        .iter()
        .map(|m| match m {
            OutboundMessage::Progress(_) => "progress",
            OutboundMessage::LiveUpdate(_) => "live",
            OutboundMessage::FinalResult(_) => "final",
            OutboundMessage::TickSummary(_) => "summary",
            _ => "other",
        })
        .collect();
    assert_eq!(kinds, vec!["progress", "live", "live", "progress", "final", "final", "summary"]);

    match &messages[4] {
        OutboundMessage::FinalResult(first) => {
            assert_eq!(first.participant_id, ParticipantId(2));
            assert_eq!(first.rank, 1);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_timeout_publishes_partial_results() {
    let config = EngineConfig {
        batch_size: 1,
        inter_batch_delay_ms: 2_000,
        evaluation_timeout_secs: 1.0,
        ..EngineConfig::default()
    };
    let service = service(config);
    for n in 1..=3 {
        service
            .submit_configuration(ParticipantId(n), ids(&["ember_core"]), format!("p{}", n))
            .unwrap();
    }

    let summary = service.process_tick(EvaluationRequest::regular(1)).await;
    assert!(summary.timed_out);
    assert_eq!(summary.player_count, 1);
    assert!(service.result(ParticipantId(1)).is_some());
    assert!(service.result(ParticipantId(2)).is_none());
    assert_eq!(service.global_stats().ticks_processed, 1);
}

#[tokio::test]
async fn test_parallel_batches_match_sequential() {
    let sequential = service(EngineConfig {
        parallel_threshold: usize::MAX,
        ..EngineConfig::default()
    });
    let parallel = service(EngineConfig {
        parallel_threshold: 1,
        ..EngineConfig::default()
    });
    let sequences = [
        ids(&["overclock", "storm_core", "ember_core"]),
        ids(&["vanguard_core", "chain_link", "ember_core"]),
        ids(&["kindling_core", "ember_core", "amplifier"]),
    ];
    for (n, slots) in sequences.iter().enumerate() {
        let participant = ParticipantId(n as u64 + 1);
        sequential.submit_configuration(participant, slots.clone(), "h").unwrap();
        parallel.submit_configuration(participant, slots.clone(), "h").unwrap();
    }

    let a = sequential.process_tick(EvaluationRequest::regular(5)).await;
    let b = parallel.process_tick(EvaluationRequest::regular(5)).await;
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_default_batches_run_in_parallel() {
    let config = EngineConfig::default();
    assert!(config.validate().is_ok());
    let participants = config.parallel_threshold as u64 + 4;
    assert!(participants as usize <= config.batch_size);

    let service = Arc::new(service(config));
    for n in 1..=participants {
        service
            .submit_configuration(ParticipantId(n), ids(&["overclock", "storm_core"]), format!("p{}", n))
            .unwrap();
    }

    let task = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.process_tick(EvaluationRequest::regular(3)).await })
    };
    let summary = task.await.expect("evaluation task completes");
    assert_eq!(summary.player_count, participants as usize);

    for n in 1..=participants {
        let stored = service.result(ParticipantId(n)).unwrap();
        let expected = service.evaluate_participant(ParticipantId(n), &ids(&["overclock", "storm_core"]), 3);
        assert_eq!(stored.report, expected);
    }
}

#[tokio::test]
async fn test_departure_between_ticks() {
    let service = service(EngineConfig::default());
    service.submit_configuration(ParticipantId(1), ids(&["ember_core"]), "a").unwrap();
    service.submit_configuration(ParticipantId(2), ids(&["ember_core"]), "b").unwrap();
    service.process_tick(EvaluationRequest::regular(1)).await;

    assert!(service.participant_departure(ParticipantId(1)));
    let summary = service.process_tick(EvaluationRequest::regular(2)).await;

    assert_eq!(summary.player_count, 1);
    assert!(service.performance(ParticipantId(1)).is_none());
    assert_eq!(service.performance(ParticipantId(2)).unwrap().ticks_participated, 2);
    assert_eq!(service.global_stats().ticks_processed, 2);
}

const FRAGILE_CATALOG: &str = r#"
[[component]]
id = "ember_core"
name = "Ember Core"
type = "core"
rarity = "common"
tags = ["fire"]
ability = { execute = "ember" }
base_stats = { base_damage = 80.0 }

[[component]]
id = "fragile_core"
name = "Fragile Core"
type = "core"
rarity = "common"
tags = ["kinetic"]
ability = { execute = "ember" }
base_stats = { base_damage = 50.0 }
requirements = [{ kind = "custom", condition = "reads_missing_entry" }]
"#;

#[tokio::test]
async fn test_panicking_condition_is_contained_to_its_component() {
    let mut conditions = ConditionRegistry::with_builtins();
    conditions.register("reads_missing_entry", |_, _| {
        let entries: Vec<bool> = Vec::new();
        Ok(entries[0])
    });
    let mut catalog = ComponentCatalog::with_conditions(conditions);
    catalog.load_str(FRAGILE_CATALOG).expect("catalog loads");
    let service = Arc::new(EvaluationService::new(Arc::new(catalog), EngineConfig::default()));

    service.submit_configuration(ParticipantId(1), ids(&["ember_core"]), "a").unwrap();
    service
        .submit_configuration(ParticipantId(2), ids(&["fragile_core", "ember_core"]), "b")
        .unwrap();

    let task = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.process_tick(EvaluationRequest::regular(1)).await })
    };
    let summary = task.await.expect("evaluation task completes");
    assert_eq!(summary.player_count, 2);

    assert_eq!(service.result(ParticipantId(1)).unwrap().total_damage, 80.0);
    let fragile = service.result(ParticipantId(2)).unwrap();
    assert_eq!(fragile.report.active_components, 1);
    assert_eq!(fragile.total_damage, 80.0);
}
