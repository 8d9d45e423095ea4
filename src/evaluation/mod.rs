//! Evaluation service: submissions, departures and per-tick batch processing

pub mod messages;
pub mod ownership;
pub mod service;

pub use messages::{FinalResult, LiveUpdate, OutboundMessage, ProgressUpdate, TickSummary, TimerUpdate, TopPerformer};
pub use ownership::{AllowAll, InventoryOwnership, OwnershipCheck};
pub use service::{
    EvaluationRequest, EvaluationService, GlobalStats, ParticipantResult, PerformanceStats,
    StoredConfiguration,
};
