//! Synergy Arena - tick-based sequence evaluation engine
//!
//! Participants submit ordered sequences of up to five components. Every
//! tick the scheduler walks BUILDING -> EVALUATING -> RESULTS, and on entering
//! EVALUATING the evaluation service simulates every stored sequence and
//! publishes ranked results.

pub mod catalog;
pub mod core;
pub mod evaluation;
pub mod scheduler;
pub mod sequence;
pub mod synergy;

pub use catalog::ComponentCatalog;
pub use crate::core::config::EngineConfig;
pub use crate::core::error::{EngineError, Result, SchemaError, ValidationError};
pub use evaluation::{EvaluationRequest, EvaluationService, OutboundMessage};
pub use scheduler::TickScheduler;
pub use synergy::{SequenceSimulator, SimulationReport};
