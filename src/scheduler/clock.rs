//! Phase clock - the BUILDING -> EVALUATING -> RESULTS state machine
//!
//! Pure state: the caller passes `now` in, the clock reports the transitions
//! that happened. Each phase is timed from its own start. A poll that comes
//! late catches up through every boundary it missed, so a slow host loop
//! never skips a tick.

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::core::config::EngineConfig;
use crate::core::types::Tick;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Building,
    Evaluating,
    Results,
}

impl Phase {
    pub fn next(&self) -> Phase {
        match self {
            Phase::Building => Phase::Evaluating,
            Phase::Evaluating => Phase::Results,
            Phase::Results => Phase::Building,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Building => "BUILDING",
            Phase::Evaluating => "EVALUATING",
            Phase::Results => "RESULTS",
        };
        f.write_str(name)
    }
}

/// A phase boundary the clock crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseTransition {
    /// BUILDING -> EVALUATING
    EvaluationStarted { tick: Tick },
    /// EVALUATING -> RESULTS
    ResultsStarted { tick: Tick },
    /// RESULTS -> BUILDING; the only transition that advances the tick
    TickCompleted { completed: Tick, next: Tick },
}

impl PhaseTransition {
    /// Phase entered by this transition
    pub fn entered(&self) -> Phase {
        match self {
            PhaseTransition::EvaluationStarted { .. } => Phase::Evaluating,
            PhaseTransition::ResultsStarted { .. } => Phase::Results,
            PhaseTransition::TickCompleted { .. } => Phase::Building,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhaseClock {
    phase: Phase,
    tick: Tick,
    phase_started: Instant,
    building: Duration,
    evaluating: Duration,
    results: Duration,
}

impl PhaseClock {
    /// Start in BUILDING of tick 1
    pub fn new(config: &EngineConfig, now: Instant) -> Self {
        Self {
            phase: Phase::Building,
            tick: 1,
            phase_started: now,
            building: config.building_duration(),
            evaluating: config.evaluating_duration(),
            results: config.results_duration(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn phase_started(&self) -> Instant {
        self.phase_started
    }

    pub fn phase_duration(&self, phase: Phase) -> Duration {
        match phase {
            Phase::Building => self.building,
            Phase::Evaluating => self.evaluating,
            Phase::Results => self.results,
        }
    }

    /// Sum of the three phase durations
    pub fn tick_duration(&self) -> Duration {
        self.building + self.evaluating + self.results
    }

    /// Time left in the current phase
    pub fn phase_remaining(&self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.phase_started);
        self.phase_duration(self.phase).saturating_sub(elapsed)
    }

    /// Time left in the current tick
    pub fn time_remaining(&self, now: Instant) -> Duration {
        let mut remaining = self.phase_remaining(now);
        let mut phase = self.phase.next();
        while phase != Phase::Building {
            remaining += self.phase_duration(phase);
            phase = phase.next();
        }
        remaining
    }

    /// Advance through every boundary at or before `now`
    pub fn poll(&mut self, now: Instant) -> Vec<PhaseTransition> {
        let mut transitions = Vec::new();
        loop {
            let boundary = self.phase_started + self.phase_duration(self.phase);
            if now < boundary {
                break;
            }
            transitions.push(self.advance_at(boundary));
        }
        transitions
    }

    /// Leave the current phase immediately
    pub fn force_advance(&mut self, now: Instant) -> PhaseTransition {
        self.advance_at(now)
    }

    fn advance_at(&mut self, at: Instant) -> PhaseTransition {
        let transition = match self.phase {
            Phase::Building => PhaseTransition::EvaluationStarted { tick: self.tick },
            Phase::Evaluating => PhaseTransition::ResultsStarted { tick: self.tick },
            Phase::Results => {
                let completed = self.tick;
                self.tick += 1;
                PhaseTransition::TickCompleted {
                    completed,
                    next: self.tick,
                }
            }
        };
        self.phase = self.phase.next();
        self.phase_started = at;
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig {
            building_duration_secs: 4.0,
            evaluating_duration_secs: 2.0,
            results_duration_secs: 1.0,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_starts_building_tick_one() {
        let now = Instant::now();
        let clock = PhaseClock::new(&config(), now);
        assert_eq!(clock.phase(), Phase::Building);
        assert_eq!(clock.tick(), 1);
        assert_eq!(clock.time_remaining(now), Duration::from_secs(7));
        assert_eq!(clock.phase_remaining(now), Duration::from_secs(4));
    }

    #[test]
    fn test_full_cycle() {
        let start = Instant::now();
        let mut clock = PhaseClock::new(&config(), start);

        assert!(clock.poll(start + Duration::from_millis(3999)).is_empty());
        assert_eq!(
            clock.poll(start + Duration::from_secs(4)),
            vec![PhaseTransition::EvaluationStarted { tick: 1 }]
        );
        assert_eq!(clock.time_remaining(start + Duration::from_secs(5)), Duration::from_secs(2));
        assert_eq!(
            clock.poll(start + Duration::from_secs(6)),
            vec![PhaseTransition::ResultsStarted { tick: 1 }]
        );
        assert_eq!(
            clock.poll(start + Duration::from_secs(7)),
            vec![PhaseTransition::TickCompleted { completed: 1, next: 2 }]
        );
        assert_eq!(clock.tick(), 2);
        assert_eq!(clock.time_remaining(start + Duration::from_secs(7)), Duration::from_secs(7));
    }

    #[test]
    fn test_late_poll_catches_up() {
        let start = Instant::now();
        let mut clock = PhaseClock::new(&config(), start);
        let transitions = clock.poll(start + Duration::from_secs(15));
        // two full ticks (14s) plus one second of BUILDING
        assert_eq!(transitions.len(), 6);
        assert_eq!(clock.tick(), 3);
        assert_eq!(clock.phase(), Phase::Building);
        assert_eq!(clock.phase_remaining(start + Duration::from_secs(15)), Duration::from_secs(3));
    }

    #[test]
    fn test_forced_advance_counts_only_completed_cycle() {
        let start = Instant::now();
        let mut clock = PhaseClock::new(&config(), start);

        assert_eq!(clock.force_advance(start), PhaseTransition::EvaluationStarted { tick: 1 });
        assert_eq!(clock.force_advance(start), PhaseTransition::ResultsStarted { tick: 1 });
        assert_eq!(clock.tick(), 1);
        assert_eq!(
            clock.force_advance(start),
            PhaseTransition::TickCompleted { completed: 1, next: 2 }
        );
        assert_eq!(clock.tick(), 2);
    }

    #[test]
    fn test_phase_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Phase::Evaluating).unwrap(), "\"EVALUATING\"");
        assert_eq!(Phase::Results.to_string(), "RESULTS");
    }
}
