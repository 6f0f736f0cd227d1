//! Read state entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MessageId;

/// Read/unread state of one conversation or room.
///
/// Owned by the entity's store and only replaced through the transition
/// functions in `application::services::notification_state_machine`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityNotificationState {
    /// Messages not yet seen by the user.
    #[serde(default)]
    pub unread_count: u32,
    /// Unread messages that mention the user. Always zero for conversations.
    #[serde(default)]
    pub mentions_count: u32,
    /// Point in time the user has read up to.
    #[serde(default)]
    pub last_read_at: Option<DateTime<Utc>>,
    /// Furthest message the user has visually seen. Only moves forward.
    #[serde(default)]
    pub last_seen_message_id: Option<MessageId>,
    /// First unseen message, where the "new messages" divider goes.
    #[serde(default)]
    pub first_new_message_id: Option<MessageId>,
}

impl EntityNotificationState {
    /// Creates a state with nothing unread.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the persisted last seen position.
    #[must_use]
    pub fn with_last_seen(mut self, message_id: Option<MessageId>) -> Self {
        self.last_seen_message_id = message_id;
        self
    }

    /// Returns true when either counter is non-zero.
    #[must_use]
    pub const fn has_unread(&self) -> bool {
        self.unread_count > 0 || self.mentions_count > 0
    }
}

/// Whether the user can currently perceive an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityContext {
    /// Entity is open/focused in the UI.
    pub is_active: bool,
    /// Application window is visible.
    pub window_visible: bool,
}

impl EntityContext {
    /// Creates a context.
    #[must_use]
    pub const fn new(is_active: bool, window_visible: bool) -> Self {
        Self {
            is_active,
            window_visible,
        }
    }

    /// The user sees new messages as they arrive.
    #[must_use]
    pub const fn sees(self) -> bool {
        self.is_active && self.window_visible
    }
}
