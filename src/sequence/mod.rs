//! Per-evaluation sequence state: instances, the bonus ledger and the
//! context that ties them together.

pub mod context;
pub mod instance;
pub mod ledger;

pub use context::{ContextEntry, SequenceContext};
pub use instance::{ComponentInstance, SlotSpec};
pub use ledger::{BonusKind, BonusLedger, BonusOp, BonusRecord};
