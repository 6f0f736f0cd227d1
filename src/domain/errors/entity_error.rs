//! Entity store error types.

use thiserror::Error;

use crate::domain::entities::EntityId;

/// Entity store error variants.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum EntityError {
    #[error("entity {id} is not tracked")]
    UnknownEntity { id: EntityId },

    #[error("entity {id} is already tracked")]
    AlreadyTracked { id: EntityId },

    #[error("persistence error: {0}")]
    Persistence(#[from] super::PersistenceError),
}

impl EntityError {
    /// Creates unknown entity error.
    #[must_use]
    pub fn unknown(id: &EntityId) -> Self {
        Self::UnknownEntity { id: id.clone() }
    }

    /// Creates already tracked error.
    #[must_use]
    pub fn already_tracked(id: &EntityId) -> Self {
        Self::AlreadyTracked { id: id.clone() }
    }

    /// Returns whether the error came from a storage collaborator.
    #[must_use]
    pub const fn is_persistence_error(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}
