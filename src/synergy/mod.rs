//! Synergy resolution: requirement checks, ability execution and the
//! two-phase sequence simulator.

pub mod abilities;
pub mod requirements;
pub mod simulator;

pub use abilities::{AbilityOutcome, DamageOutcome, WebOutcome};
pub use requirements::RequirementEvaluator;
pub use simulator::{ComponentEvaluation, SequenceSimulator, SimulationReport};
