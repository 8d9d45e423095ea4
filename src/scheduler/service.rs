//! Tick scheduler - drives the phase clock and the hourly timer
//!
//! One tokio task wakes every clock quantum and calls `step`. Entering
//! EVALUATING spawns the batch run as its own task; the clock loop never
//! awaits it. Observers are called synchronously after each step, one at a
//! time, and a failing or panicking observer is logged and skipped.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::clock::{Phase, PhaseClock, PhaseTransition};
use super::hourly::{HourlyEventTimer, HourlyTransition};
use crate::core::config::EngineConfig;
use crate::core::error::{panic_reason, EngineError};
use crate::core::types::Tick;
use crate::evaluation::{EvaluationRequest, EvaluationService, OutboundMessage, TickSummary, TimerUpdate};

/// Something observers are told about
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    PhaseChanged { tick: Tick, phase: Phase },
    EvaluationStarted(EvaluationRequest),
    ResultsStarted { tick: Tick },
    TickCompleted { completed: Tick, next: Tick },
    HourlyWarning { starts_in: Duration },
    HourlyEventStarted { damage_multiplier: f64 },
}

/// Registered callback for scheduler events
pub trait PhaseObserver: Send + Sync {
    fn name(&self) -> &str;

    fn on_event(&self, event: &SchedulerEvent) -> Result<(), String>;
}

struct SchedulerState {
    clock: PhaseClock,
    hourly: HourlyEventTimer,
    last_timer_broadcast: Instant,
    evaluation: Option<JoinHandle<TickSummary>>,
}

pub struct TickScheduler {
    config: EngineConfig,
    service: Arc<EvaluationService>,
    state: Mutex<SchedulerState>,
    observers: RwLock<Vec<Arc<dyn PhaseObserver>>>,
    messages: broadcast::Sender<OutboundMessage>,
    shutdown: watch::Sender<bool>,
}

impl std::fmt::Debug for TickScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("TickScheduler")
            .field("tick", &state.clock.tick())
            .field("phase", &state.clock.phase())
            .finish()
    }
}

impl TickScheduler {
    /// Scheduler over a service, starting BUILDING of tick 1 now
    pub fn new(service: Arc<EvaluationService>) -> Self {
        let config = service.config().clone();
        let now = Instant::now();
        let (shutdown, _) = watch::channel(false);
        Self {
            state: Mutex::new(SchedulerState {
                clock: PhaseClock::new(&config, now),
                hourly: HourlyEventTimer::new(&config, now),
                last_timer_broadcast: now,
                evaluation: None,
            }),
            messages: service.sender(),
            config,
            service,
            observers: RwLock::new(Vec::new()),
            shutdown,
        }
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn service(&self) -> &Arc<EvaluationService> {
        &self.service
    }

    pub fn subscribe(&self, observer: Arc<dyn PhaseObserver>) {
        if let Ok(mut observers) = self.observers.write() {
            tracing::debug!("Observer '{}' subscribed", observer.name());
            observers.push(observer);
        }
    }

    /// Receiver for every outbound message (scheduler and evaluation)
    pub fn messages(&self) -> broadcast::Receiver<OutboundMessage> {
        self.messages.subscribe()
    }

    pub fn tick(&self) -> Tick {
        self.state().clock.tick()
    }

    pub fn phase(&self) -> Phase {
        self.state().clock.phase()
    }

    /// Timer broadcast shape for the current instant
    pub fn snapshot(&self) -> TimerUpdate {
        let state = self.state();
        timer_update(&state, Instant::now())
    }

    /// Run the clock loop until `stop` is called
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        tracing::info!(
            "Scheduler started: tick {}s, quantum {:?}",
            self.config.tick_duration().as_secs_f64(),
            self.config.clock_quantum()
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.config.clock_quantum());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;

                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }

                    _ = interval.tick() => {
                        scheduler.step(Instant::now());
                    }
                }
            }
            tracing::info!("Scheduler stopped");
        })
    }

    /// Stop the clock loop and abandon any running evaluation
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.state().evaluation.take() {
            if !handle.is_finished() {
                tracing::warn!("Aborting in-flight evaluation on shutdown");
                handle.abort();
            }
        }
    }

    /// Advance the clocks to `now`, handling every transition on the way
    pub fn step(&self, now: Instant) -> Vec<SchedulerEvent> {
        let mut events = Vec::new();
        {
            let mut state = self.state();

            let transitions = state.clock.poll(now);
            let changed = !transitions.is_empty();
            for transition in transitions {
                self.handle_transition(&mut state, transition, &mut events);
            }

            for transition in state.hourly.poll(now) {
                self.handle_hourly(&state, transition, &mut events);
            }

            let since_broadcast = now.saturating_duration_since(state.last_timer_broadcast);
            if changed || since_broadcast >= self.config.timer_broadcast_interval() {
                state.last_timer_broadcast = now;
                self.broadcast(OutboundMessage::Timer(timer_update(&state, now)));
            }
        }
        self.notify(&events);
        events
    }

    /// Leave the current phase immediately (admin/test hook)
    pub fn force_advance(&self) -> Vec<SchedulerEvent> {
        let now = Instant::now();
        let mut events = Vec::new();
        {
            let mut state = self.state();
            let transition = state.clock.force_advance(now);
            tracing::info!("Forced phase advance: {:?}", transition);
            self.handle_transition(&mut state, transition, &mut events);
            state.last_timer_broadcast = now;
            self.broadcast(OutboundMessage::Timer(timer_update(&state, now)));
        }
        self.notify(&events);
        events
    }

    /// Start an hourly event immediately (admin/test hook)
    pub fn trigger_hourly_event(&self) -> Vec<SchedulerEvent> {
        let mut events = Vec::new();
        {
            let mut state = self.state();
            state.hourly.trigger_now(Instant::now());
            self.handle_hourly(&state, HourlyTransition::EventStarted, &mut events);
        }
        self.notify(&events);
        events
    }

    /// Wait for the most recently dispatched evaluation, if any
    pub async fn wait_for_evaluation(&self) -> Option<TickSummary> {
        let handle = self.state().evaluation.take()?;
        match handle.await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!("Evaluation task did not complete: {}", e);
                None
            }
        }
    }

    fn handle_hourly(
        &self,
        state: &SchedulerState,
        transition: HourlyTransition,
        events: &mut Vec<SchedulerEvent>,
    ) {
        match transition {
            HourlyTransition::WarningRaised { starts_in } => {
                tracing::info!("Hourly event in {:?}", starts_in);
                self.broadcast(OutboundMessage::HourlyWarning {
                    starts_in_secs: starts_in.as_secs_f64(),
                });
                events.push(SchedulerEvent::HourlyWarning { starts_in });
            }
            HourlyTransition::EventStarted => {
                let damage_multiplier = state.hourly.damage_multiplier();
                tracing::info!("Hourly event started (x{})", damage_multiplier);
                self.broadcast(OutboundMessage::HourlyEvent { damage_multiplier });
                events.push(SchedulerEvent::HourlyEventStarted { damage_multiplier });
            }
        }
    }

    fn handle_transition(
        &self,
        state: &mut SchedulerState,
        transition: PhaseTransition,
        events: &mut Vec<SchedulerEvent>,
    ) {
        match transition {
            PhaseTransition::EvaluationStarted { tick } => {
                let request = match state.hourly.apply() {
                    Some(multiplier) => EvaluationRequest::hourly(tick, multiplier),
                    None => EvaluationRequest::regular(tick),
                };
                self.dispatch_evaluation(state, request);
                events.push(SchedulerEvent::EvaluationStarted(request));
            }
            PhaseTransition::ResultsStarted { tick } => {
                events.push(SchedulerEvent::ResultsStarted { tick });
            }
            PhaseTransition::TickCompleted { completed, next } => {
                if state.hourly.clear_on_tick_complete() {
                    tracing::info!("Hourly event cleared after tick {}", completed);
                }
                events.push(SchedulerEvent::TickCompleted { completed, next });
            }
        }

        let tick = state.clock.tick();
        let phase = transition.entered();
        tracing::info!("Tick {}: {}", tick, phase);
        self.broadcast(OutboundMessage::PhaseChanged { tick, phase });
        events.push(SchedulerEvent::PhaseChanged { tick, phase });
    }

    fn dispatch_evaluation(&self, state: &mut SchedulerState, request: EvaluationRequest) {
        if let Some(previous) = state.evaluation.take() {
            if !previous.is_finished() {
                tracing::warn!(
                    "Evaluation for an earlier tick still running at tick {}; aborting it",
                    request.tick
                );
                previous.abort();
            }
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!("No tokio runtime; tick {} not evaluated", request.tick);
            return;
        };
        let service = Arc::clone(&self.service);
        state.evaluation = Some(runtime.spawn(async move { service.process_tick(request).await }));
    }

    fn broadcast(&self, message: OutboundMessage) {
        let _ = self.messages.send(message);
    }

    /// Deliver events to every observer inside a fault boundary
    fn notify(&self, events: &[SchedulerEvent]) {
        if events.is_empty() {
            return;
        }
        let observers: Vec<Arc<dyn PhaseObserver>> = match self.observers.read() {
            Ok(observers) => observers.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        for event in events {
            for observer in &observers {
                match catch_unwind(AssertUnwindSafe(|| observer.on_event(event))) {
                    Ok(Ok(())) => {}
                    Ok(Err(reason)) => {
                        let error = EngineError::Callback {
                            observer: observer.name().to_string(),
                            reason,
                        };
                        tracing::warn!("{}", error);
                    }
                    Err(panic) => {
                        tracing::error!(
                            "Observer '{}' panicked: {}",
                            observer.name(),
                            panic_reason(panic.as_ref())
                        );
                    }
                }
            }
        }
    }
}

fn timer_update(state: &SchedulerState, now: Instant) -> TimerUpdate {
    TimerUpdate {
        time_remaining: state.clock.time_remaining(now).as_secs_f64(),
        total_tick_time: state.clock.tick_duration().as_secs_f64(),
        current_tick: state.clock.tick(),
        phase: state.clock.phase(),
        is_hourly_event: state.hourly.is_active(),
        hourly_warning: state.hourly.is_warning(),
        next_hourly_event_in: state.hourly.time_until_next(now).map(|d| d.as_secs_f64()),
    }
}
