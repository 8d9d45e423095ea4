//! Ownership checks for submitted sequences
//!
//! Inventory lives outside this crate; the evaluation service asks an
//! `OwnershipCheck` collaborator whether a participant may field a component.

use ahash::{AHashMap, AHashSet};
use std::sync::RwLock;

use crate::core::types::ParticipantId;

pub trait OwnershipCheck: Send + Sync {
    fn owns(&self, participant: ParticipantId, component_id: &str) -> bool;
}

/// Accepts everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl OwnershipCheck for AllowAll {
    fn owns(&self, _participant: ParticipantId, _component_id: &str) -> bool {
        true
    }
}

/// In-memory inventory: participant -> owned component ids
#[derive(Debug, Default)]
pub struct InventoryOwnership {
    inventories: RwLock<AHashMap<ParticipantId, AHashSet<String>>>,
}

impl InventoryOwnership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, participant: ParticipantId, component_id: impl Into<String>) {
        if let Ok(mut inventories) = self.inventories.write() {
            inventories
                .entry(participant)
                .or_default()
                .insert(component_id.into());
        }
    }

    pub fn revoke(&self, participant: ParticipantId, component_id: &str) {
        if let Ok(mut inventories) = self.inventories.write() {
            if let Some(owned) = inventories.get_mut(&participant) {
                owned.remove(component_id);
            }
        }
    }

    /// Drop a participant's whole inventory
    pub fn forget(&self, participant: ParticipantId) {
        if let Ok(mut inventories) = self.inventories.write() {
            inventories.remove(&participant);
        }
    }
}

impl OwnershipCheck for InventoryOwnership {
    fn owns(&self, participant: ParticipantId, component_id: &str) -> bool {
        self.inventories
            .read()
            .map(|inventories| {
                inventories
                    .get(&participant)
                    .is_some_and(|owned| owned.contains(component_id))
            })
            .unwrap_or(false)
    }
}
