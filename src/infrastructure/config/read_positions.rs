use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::entities::{EntityId, MessageId};

/// Persisted last seen positions, keyed by entity.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadPositions {
    /// Entity id to last seen message id.
    #[serde(default)]
    pub positions: BTreeMap<EntityId, MessageId>,
}

impl ReadPositions {
    /// Position of an entity.
    #[must_use]
    pub fn get(&self, entity: &EntityId) -> Option<&MessageId> {
        self.positions.get(entity)
    }

    /// Stores a position. Returns whether the value changed.
    pub fn set(&mut self, entity: EntityId, message_id: MessageId) -> bool {
        self.positions.insert(entity, message_id.clone()) != Some(message_id)
    }

    /// Forgets a position. Returns whether one existed.
    pub fn remove(&mut self, entity: &EntityId) -> bool {
        self.positions.remove(entity).is_some()
    }
}
