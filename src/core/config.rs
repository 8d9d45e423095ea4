//! Engine configuration with documented constants
//!
//! All tunable numbers are collected here with explanations of their purpose
//! and how they interact with each other. Damage balancing lives in the
//! component catalog data, not here.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::core::error::{EngineError, Result};

/// Configuration for the tick scheduler and evaluation service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // === PHASE CLOCK ===
    /// Length of the BUILDING phase (seconds)
    ///
    /// Participants arrange and submit sequences during this window.
    pub building_duration_secs: f64,

    /// Length of the EVALUATING phase (seconds)
    ///
    /// Evaluation is dispatched at the start of this phase and runs in the
    /// background; the phase ends on the clock whether or not it finished.
    pub evaluating_duration_secs: f64,

    /// Length of the RESULTS phase (seconds)
    pub results_duration_secs: f64,

    /// Optional explicit tick duration (seconds)
    ///
    /// The tick is always the sum of the three phases. If this is set it must
    /// agree with that sum; it exists so configuration files can state it.
    pub tick_duration_secs: Option<f64>,

    /// How often the phase clock wakes up (milliseconds)
    ///
    /// Phase transitions are detected at this resolution. 100ms keeps the
    /// clock responsive without busy looping.
    pub clock_quantum_ms: u64,

    // === HOURLY EVENT ===
    /// Interval between hourly events (seconds)
    pub hourly_interval_secs: f64,

    /// Lead time before an hourly event during which the warning flag is raised
    /// (seconds). Must be shorter than the interval.
    pub hourly_warning_secs: f64,

    /// Damage multiplier applied to published totals while the event is active
    pub hourly_damage_multiplier: f64,

    // === BATCHING ===
    /// Participants evaluated per batch
    ///
    /// Bounds the work done between two yields of the batch processor.
    pub batch_size: usize,

    /// Pause between batches (milliseconds)
    pub inter_batch_delay_ms: u64,

    /// Overall evaluation budget per tick (seconds)
    ///
    /// When exceeded, unprocessed participants are skipped and whatever was
    /// computed is published as final for the tick.
    pub evaluation_timeout_secs: f64,

    /// Minimum batch size before evaluating participants in parallel
    ///
    /// Below this threshold the rayon fan-out costs more than it saves.
    /// Must not exceed `batch_size`, or no batch ever runs in parallel.
    pub parallel_threshold: usize,

    // === SUBMISSION RULES ===
    /// Whether a submitted sequence may contain empty slots
    pub allow_empty_slots: bool,

    /// Whether submissions are checked against the ownership collaborator
    pub enforce_ownership: bool,

    /// Highest evolution level accepted on a submitted slot
    pub max_evolution_level: u32,

    // === BROADCAST ===
    /// Minimum interval between progress updates during EVALUATING (milliseconds)
    pub progress_interval_ms: u64,

    /// Interval between timer broadcasts (milliseconds)
    pub timer_broadcast_interval_ms: u64,

    /// Number of entries in the global tick summary leaderboard
    pub top_performers: usize,

    /// Capacity of the outbound broadcast channel
    ///
    /// Slow receivers that fall further behind than this lose messages.
    pub broadcast_capacity: usize,

    // === DETERMINISM ===
    /// Seed mixed with tick number and participant id for crit rolls
    pub rng_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            // One minute tick: 40s build, 15s evaluate, 5s results
            building_duration_secs: 40.0,
            evaluating_duration_secs: 15.0,
            results_duration_secs: 5.0,
            tick_duration_secs: None,
            clock_quantum_ms: 100,

            // Hourly event with a five minute warning
            hourly_interval_secs: 3600.0,
            hourly_warning_secs: 300.0,
            hourly_damage_multiplier: 100.0,

            // Batching
            batch_size: 25,
            inter_batch_delay_ms: 10,
            evaluation_timeout_secs: 10.0,
            parallel_threshold: 16,

            // Submission
            allow_empty_slots: true,
            enforce_ownership: true,
            max_evolution_level: 10,

            // Broadcast
            progress_interval_ms: 250,
            timer_broadcast_interval_ms: 1000,
            top_performers: 10,
            broadcast_capacity: 1024,

            rng_seed: 0x5EED,
        }
    }
}

impl EngineConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from TOML. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate().map_err(EngineError::Config)?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        let phases = [
            ("building_duration_secs", self.building_duration_secs),
            ("evaluating_duration_secs", self.evaluating_duration_secs),
            ("results_duration_secs", self.results_duration_secs),
        ];
        for (name, value) in phases {
            if !value.is_finite() || value <= 0.0 {
                return Err(format!("{} must be positive (got {})", name, value));
            }
        }

        let sum = self.phase_sum_secs();
        if let Some(tick) = self.tick_duration_secs {
            if (tick - sum).abs() > 1e-6 {
                return Err(format!(
                    "tick_duration_secs ({}) must equal the sum of phase durations ({})",
                    tick, sum
                ));
            }
        }

        if self.hourly_interval_secs <= 0.0 {
            return Err("hourly_interval_secs must be positive".into());
        }

        if self.hourly_warning_secs < 0.0 || self.hourly_warning_secs >= self.hourly_interval_secs
        {
            return Err(format!(
                "hourly_warning_secs ({}) must be in [0, hourly_interval_secs ({}))",
                self.hourly_warning_secs, self.hourly_interval_secs
            ));
        }

        if !self.hourly_damage_multiplier.is_finite() || self.hourly_damage_multiplier < 0.0 {
            return Err("hourly_damage_multiplier must be a non-negative number".into());
        }

        if self.batch_size == 0 {
            return Err("batch_size must be at least 1".into());
        }

        if self.parallel_threshold > self.batch_size {
            return Err(format!(
                "parallel_threshold ({}) exceeds batch_size ({}); batches would never run in parallel",
                self.parallel_threshold, self.batch_size
            ));
        }

        if self.evaluation_timeout_secs <= 0.0 {
            return Err("evaluation_timeout_secs must be positive".into());
        }

        if self.clock_quantum_ms == 0 {
            return Err("clock_quantum_ms must be at least 1".into());
        }

        if self.broadcast_capacity == 0 {
            return Err("broadcast_capacity must be at least 1".into());
        }

        Ok(())
    }

    fn phase_sum_secs(&self) -> f64 {
        self.building_duration_secs + self.evaluating_duration_secs + self.results_duration_secs
    }

    pub fn building_duration(&self) -> Duration {
        Duration::from_secs_f64(self.building_duration_secs)
    }

    pub fn evaluating_duration(&self) -> Duration {
        Duration::from_secs_f64(self.evaluating_duration_secs)
    }

    pub fn results_duration(&self) -> Duration {
        Duration::from_secs_f64(self.results_duration_secs)
    }

    /// Full tick: the sum of the three phase durations
    pub fn tick_duration(&self) -> Duration {
        self.building_duration() + self.evaluating_duration() + self.results_duration()
    }

    pub fn hourly_interval(&self) -> Duration {
        Duration::from_secs_f64(self.hourly_interval_secs)
    }

    pub fn hourly_warning(&self) -> Duration {
        Duration::from_secs_f64(self.hourly_warning_secs)
    }

    pub fn clock_quantum(&self) -> Duration {
        Duration::from_millis(self.clock_quantum_ms)
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.evaluation_timeout_secs)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn timer_broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.timer_broadcast_interval_ms)
    }
}
