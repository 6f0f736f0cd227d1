//! Message ingestion DTOs.

use serde::{Deserialize, Serialize};

use crate::domain::entities::EntityId;

/// Pagination direction of a fetched history page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaginationDirection {
    /// Older history, strictly before the loaded timeline.
    Backward,
    /// Newer history after a gap; may interleave with loaded messages.
    Forward,
}

/// Producer of a batch of messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSource {
    /// Pushed by the transport as it happens.
    Live,
    /// Server history page.
    Page(PaginationDirection),
    /// Local cache read.
    Cache(PaginationDirection),
}

impl MessageSource {
    /// Merge direction used for this source.
    #[must_use]
    pub const fn direction(self) -> PaginationDirection {
        match self {
            Self::Live => PaginationDirection::Forward,
            Self::Page(direction) | Self::Cache(direction) => direction,
        }
    }

    /// Whether accepted messages should be written back to the cache.
    #[must_use]
    pub const fn persists_to_cache(self) -> bool {
        !matches!(self, Self::Cache(_))
    }

    /// Whether accepted messages go through the read-state transitions.
    /// Cached messages already did when they first arrived, and older
    /// history pages predate everything the read state has seen.
    #[must_use]
    pub const fn updates_read_state(self) -> bool {
        matches!(self, Self::Live | Self::Page(PaginationDirection::Forward))
    }
}

/// A notification the caller may deliver. How it is rendered is up to the
/// caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyDecision {
    /// New message in a conversation.
    Conversation,
    /// New message in a room.
    Room {
        /// The message mentions the user.
        is_mention: bool,
    },
}

/// Outcome of ingesting a batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IngestReport {
    /// Messages that were not already in the timeline.
    pub accepted: usize,
    /// The read state changed.
    pub state_changed: bool,
    /// Notification for a live message, if one qualifies.
    pub notification: Option<NotifyDecision>,
}

impl IngestReport {
    /// Report for a batch containing only known messages.
    #[must_use]
    pub fn duplicates_only() -> Self {
        Self::default()
    }
}

/// Published whenever any tracked entity changed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoreSnapshot {
    /// Store version; bumps on every change.
    pub version: u64,
    /// Application badge value.
    pub badge_count: u32,
    /// Currently active entity.
    pub active: Option<EntityId>,
}
