//! Outbound message shapes
//!
//! Everything the engine tells the outside world goes through
//! `OutboundMessage`. Field names are camelCase on the wire; the transport
//! itself is someone else's problem.

use serde::Serialize;

use crate::core::types::{ParticipantId, Tick};
use crate::scheduler::clock::Phase;
use crate::synergy::ComponentEvaluation;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum OutboundMessage {
    PhaseChanged { tick: Tick, phase: Phase },
    Timer(TimerUpdate),
    Progress(ProgressUpdate),
    LiveUpdate(LiveUpdate),
    FinalResult(FinalResult),
    TickSummary(TickSummary),
    #[serde(rename_all = "camelCase")]
    HourlyWarning { starts_in_secs: f64 },
    #[serde(rename_all = "camelCase")]
    HourlyEvent { damage_multiplier: f64 },
}

/// Clock state for countdown displays
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerUpdate {
    pub time_remaining: f64,
    pub total_tick_time: f64,
    pub current_tick: Tick,
    pub phase: Phase,
    pub is_hourly_event: bool,
    pub hourly_warning: bool,
    pub next_hourly_event_in: Option<f64>,
}

/// Throttled batch progress during EVALUATING
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub phase: Phase,
    /// 0.0..=1.0
    pub progress: f64,
    /// Participants in the batch being processed
    pub currently_processing: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveUpdate {
    pub participant_id: ParticipantId,
    pub total_damage_so_far: f64,
    pub active_component_count: usize,
    pub best_component: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalResult {
    pub participant_id: ParticipantId,
    pub tick: Tick,
    /// Damage after the hourly multiplier
    pub total_damage: f64,
    /// Damage as simulated
    pub base_damage: f64,
    /// 1-based
    pub rank: usize,
    pub active_components: usize,
    pub component_breakdown: Vec<ComponentEvaluation>,
    pub is_hourly_event: bool,
    pub damage_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPerformer {
    pub participant_id: ParticipantId,
    pub total_damage: f64,
    pub rank: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSummary {
    pub tick: Tick,
    pub total_damage: f64,
    pub player_count: usize,
    pub average_damage: f64,
    pub top_damage: f64,
    pub top_performers: Vec<TopPerformer>,
    /// Processing stopped early; only some participants were evaluated
    pub timed_out: bool,
}
