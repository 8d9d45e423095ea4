use std::any::Any;
use thiserror::Error;

use crate::core::types::ParticipantId;

/// A submitted configuration was rejected. The configuration is not stored.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("sequence has {len} slots, at most {max} allowed")]
    SequenceTooLong { len: usize, max: usize },

    #[error("sequence contains no components")]
    EmptySequence,

    #[error("slot {slot} is empty and empty slots are not permitted")]
    EmptySlotNotAllowed { slot: usize },

    #[error("slot {slot} references unknown component '{id}'")]
    UnknownComponent { slot: usize, id: String },

    #[error("{participant} does not own component '{id}' (slot {slot})")]
    NotOwned {
        participant: ParticipantId,
        slot: usize,
        id: String,
    },

    #[error("slot {slot} has evolution level {level}, above the maximum {max}")]
    InvalidEvolution { slot: usize, level: u32, max: u32 },
}

/// A catalog definition failed schema validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("definition is missing an id")]
    MissingId,

    #[error("component '{0}' is defined twice")]
    DuplicateId(String),

    #[error("component '{id}' is a {component_type} but its ability is {ability}")]
    AbilityMismatch {
        id: String,
        component_type: String,
        ability: String,
    },

    #[error("component '{id}' requirement #{index} ({kind}): {reason}")]
    InvalidRequirement {
        id: String,
        index: usize,
        kind: String,
        reason: String,
    },

    #[error("component '{id}' has non-finite base stat '{stat}'")]
    InvalidStat { id: String, stat: String },
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Component not found in catalog: {id}")]
    CatalogLookup { id: String },

    #[error("Requirement of '{component}' could not be evaluated: {reason}")]
    RequirementEvaluation { component: String, reason: String },

    #[error("Observer '{observer}' failed: {reason}")]
    Callback { observer: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Readable message from a caught panic payload
pub fn panic_reason(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_string())
}
