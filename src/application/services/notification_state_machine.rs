//! Read/unread transitions for conversations and rooms.
//!
//! Every transition takes the current state behind an [`Arc`] and returns
//! the next one. When nothing changes the *same* `Arc` is handed back, so
//! subscribers can skip updates with [`Arc::ptr_eq`].

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, trace, warn};

use crate::domain::entities::{EntityContext, EntityNotificationState, MessageId, MessageView};

/// Messages older than this never trigger a notification.
pub const NOTIFICATION_FRESHNESS_WINDOW_SECS: i64 = 5 * 60;

/// Shared, immutable read state.
pub type SharedState = Arc<EntityNotificationState>;

/// How an incoming message affects counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveOptions {
    /// Count the message as unread.
    pub increment_unread: bool,
    /// Count the message as an unread mention (rooms only).
    pub increment_mentions: bool,
    /// Count delayed messages as new. Conversations use this for messages
    /// stored while the user was offline.
    pub treat_delayed_as_new: bool,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            increment_unread: true,
            increment_mentions: false,
            treat_delayed_as_new: false,
        }
    }
}

/// Outcome of the room notification predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoomNotifyDecision {
    /// A notification should be delivered.
    pub notify: bool,
    /// The message mentions the user.
    pub is_mention: bool,
}

/// Independent unread sources summed into the application badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BadgeSources {
    /// Sum of conversation unread counts.
    pub conversations: u32,
    /// Sum of room unread counts.
    pub rooms: u32,
    /// Pending events (invitations, subscription requests).
    pub pending_events: u32,
}

fn commit(state: &SharedState, next: EntityNotificationState) -> SharedState {
    if **state == next {
        Arc::clone(state)
    } else {
        Arc::new(next)
    }
}

fn is_markable<M: MessageView>(message: &M) -> bool {
    !message.is_outgoing() && !message.is_delayed()
}

fn position_of<M: MessageView>(messages: &[M], id: &MessageId) -> Option<usize> {
    messages.iter().position(|m| m.id() == id)
}

/// Applies an incoming or outgoing message.
#[must_use]
pub fn on_message_received<M: MessageView>(
    state: &SharedState,
    message: &M,
    ctx: EntityContext,
    options: ReceiveOptions,
) -> SharedState {
    if message.is_outgoing() {
        trace!(message_id = %message.id(), "Outgoing message clears unread state");
        return commit(
            state,
            EntityNotificationState {
                unread_count: 0,
                mentions_count: 0,
                last_read_at: Some(message.timestamp()),
                last_seen_message_id: state.last_seen_message_id.clone(),
                first_new_message_id: None,
            },
        );
    }

    if message.is_delayed() && !options.treat_delayed_as_new {
        return Arc::clone(state);
    }

    if ctx.sees() {
        return commit(
            state,
            EntityNotificationState {
                unread_count: 0,
                mentions_count: 0,
                last_read_at: Some(message.timestamp()),
                ..(**state).clone()
            },
        );
    }

    let mut next = (**state).clone();
    if options.increment_unread {
        next.unread_count = next.unread_count.saturating_add(1);
    }
    if options.increment_mentions {
        next.mentions_count = next.mentions_count.saturating_add(1);
    }
    if next.last_read_at.is_none() {
        next.last_read_at = Some(DateTime::<Utc>::UNIX_EPOCH);
    }
    if ctx.is_active && !ctx.window_visible && next.first_new_message_id.is_none() {
        debug!(message_id = %message.id(), "Placing new messages marker");
        next.first_new_message_id = Some(message.id().clone());
    }
    commit(state, next)
}

/// Opens an entity: places the marker and clears counters.
///
/// The marker goes on the first incoming live message after the last seen
/// one. When the last seen message is outside `messages`, `last_read_at`
/// is used instead, and with no `last_read_at` any pending unread count
/// marks the first incoming live message.
#[must_use]
pub fn on_activate<M: MessageView>(state: &SharedState, messages: &[M]) -> SharedState {
    let mut next = (**state).clone();

    let seen_position = state
        .last_seen_message_id
        .as_ref()
        .and_then(|id| position_of(messages, id));

    let marker = if let Some(position) = seen_position {
        messages[position + 1..].iter().find(|m| is_markable(*m))
    } else {
        if let Some(last_seen) = &state.last_seen_message_id {
            warn!(
                message_id = %last_seen,
                "Last seen message outside loaded timeline, using timestamp fallback"
            );
            if let Some(last) = messages.last() {
                next.last_seen_message_id = Some(last.id().clone());
            }
        }

        match state.last_read_at {
            Some(last_read_at) => messages
                .iter()
                .find(|m| is_markable(*m) && m.timestamp() > last_read_at),
            None if state.unread_count > 0 => messages.iter().find(|m| is_markable(*m)),
            None => None,
        }
    };

    next.first_new_message_id = marker.map(|m| m.id().clone());
    next.unread_count = 0;
    next.mentions_count = 0;
    if let Some(last) = messages.last() {
        next.last_read_at = Some(last.timestamp());
    }

    commit(state, next)
}

/// Leaves an entity: drops the marker.
#[must_use]
pub fn on_deactivate(state: &SharedState) -> SharedState {
    on_clear_marker(state)
}

/// Explicit "mark as read" at the current time when no timestamp is given.
#[must_use]
pub fn on_mark_as_read(
    state: &SharedState,
    last_message_timestamp: Option<DateTime<Utc>>,
) -> SharedState {
    on_mark_as_read_at(state, last_message_timestamp, Utc::now())
}

/// Explicit "mark as read" with an explicit current time.
///
/// The marker is kept; its lifetime follows activation.
#[must_use]
pub fn on_mark_as_read_at(
    state: &SharedState,
    last_message_timestamp: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> SharedState {
    commit(
        state,
        EntityNotificationState {
            unread_count: 0,
            mentions_count: 0,
            last_read_at: Some(last_message_timestamp.unwrap_or(now)),
            ..(**state).clone()
        },
    )
}

/// The window became visible again.
///
/// Acts as a read confirmation for the active entity only.
#[must_use]
pub fn on_window_became_visible(
    state: &SharedState,
    is_active: bool,
    last_message_timestamp: Option<DateTime<Utc>>,
) -> SharedState {
    if !is_active || !state.has_unread() {
        return Arc::clone(state);
    }
    on_mark_as_read(state, last_message_timestamp)
}

/// Advances the last seen position when `message_id` is further down the
/// timeline than the current one.
///
/// Ids missing from `messages` are ignored. A current position missing from
/// `messages` has been trimmed off the front, so any known id is later.
#[must_use]
pub fn on_message_seen<M: MessageView>(
    state: &SharedState,
    message_id: &MessageId,
    messages: &[M],
) -> SharedState {
    let Some(new_position) = position_of(messages, message_id) else {
        trace!(message_id = %message_id, "Seen message not in timeline, ignoring");
        return Arc::clone(state);
    };

    let advances = match &state.last_seen_message_id {
        None => true,
        Some(current) => {
            position_of(messages, current).is_none_or(|current| new_position > current)
        }
    };

    if !advances {
        return Arc::clone(state);
    }

    commit(
        state,
        EntityNotificationState {
            last_seen_message_id: Some(message_id.clone()),
            ..(**state).clone()
        },
    )
}

/// Drops the marker unconditionally.
#[must_use]
pub fn on_clear_marker(state: &SharedState) -> SharedState {
    if state.first_new_message_id.is_none() {
        return Arc::clone(state);
    }
    Arc::new(EntityNotificationState {
        first_new_message_id: None,
        ..(**state).clone()
    })
}

fn is_fresh<M: MessageView>(message: &M, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(message.timestamp())
        <= TimeDelta::seconds(NOTIFICATION_FRESHNESS_WINDOW_SECS)
}

fn qualifies_for_notification<M: MessageView>(
    message: &M,
    ctx: EntityContext,
    now: DateTime<Utc>,
) -> bool {
    !message.is_outgoing() && !message.is_delayed() && is_fresh(message, now) && !ctx.sees()
}

/// Whether a conversation message deserves a notification.
#[must_use]
pub fn should_notify_conversation<M: MessageView>(message: &M, ctx: EntityContext) -> bool {
    should_notify_conversation_at(message, ctx, Utc::now())
}

/// [`should_notify_conversation`] evaluated at `now`.
#[must_use]
pub fn should_notify_conversation_at<M: MessageView>(
    message: &M,
    ctx: EntityContext,
    now: DateTime<Utc>,
) -> bool {
    qualifies_for_notification(message, ctx, now)
}

/// Whether a room message deserves a notification. Mentions always do,
/// other messages only with notify-all enabled.
#[must_use]
pub fn should_notify_room<M: MessageView>(
    message: &M,
    ctx: EntityContext,
    notify_all: bool,
) -> RoomNotifyDecision {
    should_notify_room_at(message, ctx, notify_all, Utc::now())
}

/// [`should_notify_room`] evaluated at `now`.
#[must_use]
pub fn should_notify_room_at<M: MessageView>(
    message: &M,
    ctx: EntityContext,
    notify_all: bool,
    now: DateTime<Utc>,
) -> RoomNotifyDecision {
    let is_mention = message.is_mention();
    let notify = qualifies_for_notification(message, ctx, now) && (is_mention || notify_all);
    RoomNotifyDecision { notify, is_mention }
}

/// Application badge value.
///
/// Each per-entity count is kept exact by the transitions above, so no
/// focus reconciliation happens here.
#[must_use]
pub const fn compute_badge_count(sources: BadgeSources) -> u32 {
    sources
        .conversations
        .saturating_add(sources.rooms)
        .saturating_add(sources.pending_events)
}
