//! Component catalog
//!
//! Static definitions of every component a participant can slot: type,
//! rarity, base stats, tags, activation requirements and ability. Loaded
//! once from TOML, immutable afterwards.

pub mod registry;
pub mod schema;

pub use registry::{ComponentCatalog, ConditionRegistry, CustomCondition};
pub use schema::*;
