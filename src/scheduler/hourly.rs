//! Hourly event timer
//!
//! Runs beside the phase clock, not inside it. A warning goes up a fixed
//! lead time before each event. Once the event fires it stays active until
//! an evaluation has picked it up and that tick has completed, so an event
//! that starts after a dispatch carries over to the next one.

use std::time::Duration;
use tokio::time::Instant;

use crate::core::config::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HourlyTransition {
    WarningRaised { starts_in: Duration },
    EventStarted,
}

#[derive(Debug, Clone)]
pub struct HourlyEventTimer {
    interval: Duration,
    warning_lead: Duration,
    multiplier: f64,
    next_event_at: Instant,
    armed: bool,
    warning: bool,
    active: bool,
    applied: bool,
}

impl HourlyEventTimer {
    /// Armed, with the first event one interval from `now`
    pub fn new(config: &EngineConfig, now: Instant) -> Self {
        let interval = config.hourly_interval();
        Self {
            interval,
            warning_lead: config.hourly_warning(),
            multiplier: config.hourly_damage_multiplier,
            next_event_at: now + interval,
            armed: true,
            warning: false,
            active: false,
            applied: false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn is_warning(&self) -> bool {
        self.warning
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Stop scheduling events. An active event stays active until cleared.
    pub fn disarm(&mut self) {
        self.armed = false;
        self.warning = false;
    }

    /// Resume scheduling, next event one interval from `now`
    pub fn arm(&mut self, now: Instant) {
        self.armed = true;
        self.next_event_at = now + self.interval;
    }

    /// Damage multiplier to apply right now
    pub fn damage_multiplier(&self) -> f64 {
        if self.active {
            self.multiplier
        } else {
            1.0
        }
    }

    /// Hand the active multiplier to an evaluation about to be dispatched
    pub fn apply(&mut self) -> Option<f64> {
        if !self.active {
            return None;
        }
        self.applied = true;
        Some(self.multiplier)
    }

    pub fn time_until_next(&self, now: Instant) -> Option<Duration> {
        self.armed
            .then(|| self.next_event_at.saturating_duration_since(now))
    }

    pub fn poll(&mut self, now: Instant) -> Vec<HourlyTransition> {
        let mut transitions = Vec::new();
        if !self.armed {
            return transitions;
        }

        if now >= self.next_event_at {
            // Late polls fire once; missed intervals are skipped
            while self.next_event_at <= now {
                self.next_event_at += self.interval;
            }
            self.warning = false;
            self.active = true;
            self.applied = false;
            transitions.push(HourlyTransition::EventStarted);
            return transitions;
        }

        let starts_in = self.next_event_at - now;
        if !self.warning && starts_in <= self.warning_lead {
            self.warning = true;
            transitions.push(HourlyTransition::WarningRaised { starts_in });
        }
        transitions
    }

    /// Fire immediately; the regular schedule restarts from `now`
    pub fn trigger_now(&mut self, now: Instant) {
        self.warning = false;
        self.active = true;
        self.applied = false;
        self.next_event_at = now + self.interval;
    }

    /// Called on every RESULTS -> BUILDING transition. Only an event some
    /// evaluation has already applied is cleared.
    pub fn clear_on_tick_complete(&mut self) -> bool {
        if !(self.active && self.applied) {
            return false;
        }
        self.active = false;
        self.applied = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig {
            hourly_interval_secs: 60.0,
            hourly_warning_secs: 10.0,
            hourly_damage_multiplier: 100.0,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_warning_then_event() {
        let start = Instant::now();
        let mut timer = HourlyEventTimer::new(&config(), start);

        assert!(timer.poll(start + Duration::from_secs(49)).is_empty());
        assert_eq!(
            timer.poll(start + Duration::from_secs(50)),
            vec![HourlyTransition::WarningRaised { starts_in: Duration::from_secs(10) }]
        );
        // warning raised once
        assert!(timer.poll(start + Duration::from_secs(55)).is_empty());
        assert!(timer.is_warning());
        assert_eq!(timer.damage_multiplier(), 1.0);

        assert_eq!(
            timer.poll(start + Duration::from_secs(60)),
            vec![HourlyTransition::EventStarted]
        );
        assert!(timer.is_active());
        assert!(!timer.is_warning());
        assert_eq!(timer.damage_multiplier(), 100.0);
        assert_eq!(
            timer.time_until_next(start + Duration::from_secs(60)),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_cleared_at_tick_completion() {
        let start = Instant::now();
        let mut timer = HourlyEventTimer::new(&config(), start);
        timer.trigger_now(start);
        assert!(timer.is_active());

        // stays active however long the tick runs
        assert!(timer.poll(start + Duration::from_secs(30)).is_empty());
        assert!(timer.is_active());

        assert_eq!(timer.apply(), Some(100.0));
        assert!(timer.clear_on_tick_complete());
        assert!(!timer.is_active());
        assert!(!timer.clear_on_tick_complete());
        assert_eq!(timer.damage_multiplier(), 1.0);
    }

    #[test]
    fn test_unapplied_event_survives_tick_completion() {
        let start = Instant::now();
        let mut timer = HourlyEventTimer::new(&config(), start);
        assert_eq!(timer.apply(), None);

        assert_eq!(
            timer.poll(start + Duration::from_secs(60)),
            vec![HourlyTransition::EventStarted]
        );
        // fired after this tick's dispatch
        assert!(!timer.clear_on_tick_complete());
        assert!(timer.is_active());

        assert_eq!(timer.apply(), Some(100.0));
        assert!(timer.clear_on_tick_complete());
        assert!(!timer.is_active());
    }

    #[test]
    fn test_disarmed_timer_is_silent() {
        let start = Instant::now();
        let mut timer = HourlyEventTimer::new(&config(), start);
        timer.disarm();
        assert!(timer.poll(start + Duration::from_secs(120)).is_empty());
        assert_eq!(timer.time_until_next(start), None);

        timer.arm(start + Duration::from_secs(120));
        assert_eq!(
            timer.time_until_next(start + Duration::from_secs(120)),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_late_poll_fires_once() {
        let start = Instant::now();
        let mut timer = HourlyEventTimer::new(&config(), start);
        let transitions = timer.poll(start + Duration::from_secs(200));
        assert_eq!(transitions, vec![HourlyTransition::EventStarted]);
        assert_eq!(
            timer.time_until_next(start + Duration::from_secs(200)),
            Some(Duration::from_secs(40))
        );
    }
}
