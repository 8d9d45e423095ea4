//! Tick/phase scheduling: the phase clock, the hourly event timer and the
//! tokio service that drives both.

pub mod clock;
pub mod hourly;
pub mod service;

pub use clock::{Phase, PhaseClock, PhaseTransition};
pub use hourly::{HourlyEventTimer, HourlyTransition};
pub use service::{PhaseObserver, SchedulerEvent, TickScheduler};
