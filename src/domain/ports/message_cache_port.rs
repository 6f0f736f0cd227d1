//! Message cache port definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::entities::{EntityId, NotificationMessage};
use crate::domain::errors::PersistenceError;

/// Window of cached history to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct HistoryQuery {
    pub before: Option<DateTime<Utc>>,
    pub after: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl HistoryQuery {
    /// Most recent messages.
    #[must_use]
    pub const fn latest(limit: usize) -> Self {
        Self {
            before: None,
            after: None,
            limit,
        }
    }

    /// Messages strictly older than `timestamp`.
    #[must_use]
    pub const fn before(timestamp: DateTime<Utc>, limit: usize) -> Self {
        Self {
            before: Some(timestamp),
            after: None,
            limit,
        }
    }

    /// Messages strictly newer than `timestamp`.
    #[must_use]
    pub const fn after(timestamp: DateTime<Utc>, limit: usize) -> Self {
        Self {
            before: None,
            after: Some(timestamp),
            limit,
        }
    }
}

/// Port for the local message cache.
///
/// The cache is never the source of truth; it only lets the in-memory
/// timeline recover entries it trimmed.
#[async_trait]
pub trait MessageCachePort: Send + Sync {
    /// Loads a chronologically ordered batch.
    async fn load(
        &self,
        entity: &EntityId,
        query: HistoryQuery,
    ) -> Result<Vec<NotificationMessage>, PersistenceError>;

    /// Stores new messages.
    async fn store(
        &self,
        entity: &EntityId,
        messages: &[NotificationMessage],
    ) -> Result<(), PersistenceError>;

    /// Drops all cached messages of an entity.
    async fn clear(&self, entity: &EntityId) -> Result<(), PersistenceError>;
}
