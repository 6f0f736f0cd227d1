//! Merging of live, cached and paginated messages into one timeline.
//!
//! Timelines are kept in ascending timestamp order and bounded to a
//! maximum length; trimmed entries stay recoverable from the message cache.

use std::collections::HashSet;

use tracing::trace;

use crate::domain::entities::{ArchiveId, MessageId, MessageView, SenderId};

/// Deduplication identity of a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKey {
    /// Server archive id, globally unique.
    Archive(ArchiveId),
    /// Client id, unique per sender only.
    Local {
        /// Author.
        sender: SenderId,
        /// Client-assigned id.
        id: MessageId,
    },
}

/// Every key one message is known by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageKeys {
    archive: Option<MessageKey>,
    local: MessageKey,
}

impl MessageKeys {
    /// Keys made of an optional archive id and the sender/id pair.
    #[must_use]
    pub fn new(archive_id: Option<&ArchiveId>, sender: &SenderId, id: &MessageId) -> Self {
        Self {
            archive: archive_id.cloned().map(MessageKey::Archive),
            local: MessageKey::Local {
                sender: sender.clone(),
                id: id.clone(),
            },
        }
    }

    /// Iterates over the keys.
    pub fn iter(&self) -> impl Iterator<Item = &MessageKey> {
        self.archive.iter().chain(std::iter::once(&self.local))
    }
}

impl IntoIterator for MessageKeys {
    type Item = MessageKey;
    type IntoIter = std::iter::Chain<std::option::IntoIter<MessageKey>, std::iter::Once<MessageKey>>;

    fn into_iter(self) -> Self::IntoIter {
        self.archive.into_iter().chain(std::iter::once(self.local))
    }
}

/// Set of keys already present in a timeline.
pub type MessageKeySet = HashSet<MessageKey>;

/// Default identity rule: archive id when present, always sender/id.
#[must_use]
pub fn message_keys<M: MessageView>(message: &M) -> MessageKeys {
    MessageKeys::new(message.archive_id(), message.sender(), message.id())
}

/// Collects the keys of every message once, for constant-time lookups.
#[must_use]
pub fn build_message_key_set<M, F>(messages: &[M], key_fn: F) -> MessageKeySet
where
    F: Fn(&M) -> MessageKeys,
{
    messages.iter().flat_map(key_fn).collect()
}

/// A message is a duplicate when any of its keys is already known.
#[must_use]
pub fn is_message_duplicate(keys: &MessageKeys, known: &MessageKeySet) -> bool {
    keys.iter().any(|key| known.contains(key))
}

/// Stable ascending sort by timestamp; equal timestamps keep their order.
pub fn sort_messages_by_timestamp<M: MessageView>(messages: &mut [M]) {
    messages.sort_by_key(|m| m.timestamp());
}

/// Keeps only the `max_count` most recent messages.
pub fn trim_messages<M>(messages: &mut Vec<M>, max_count: usize) {
    if messages.len() <= max_count {
        return;
    }
    let excess = messages.len() - max_count;
    messages.drain(..excess);
}

/// Result of merging a batch into a timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome<M> {
    /// Every incoming message was already present; the timeline is untouched.
    Unchanged,
    /// At least one message was new.
    Merged {
        /// Resulting timeline.
        messages: Vec<M>,
        /// Accepted messages, oldest first.
        new_messages: Vec<M>,
    },
}

impl<M> MergeOutcome<M> {
    /// Whether the batch contained anything new.
    #[must_use]
    pub const fn has_new(&self) -> bool {
        matches!(self, Self::Merged { .. })
    }

    /// Number of accepted messages.
    #[must_use]
    pub fn new_count(&self) -> usize {
        match self {
            Self::Unchanged => 0,
            Self::Merged { new_messages, .. } => new_messages.len(),
        }
    }

    /// Accepted messages, empty when unchanged.
    #[must_use]
    pub fn new_messages(&self) -> &[M] {
        match self {
            Self::Unchanged => &[],
            Self::Merged { new_messages, .. } => new_messages,
        }
    }
}

impl<M: Clone> MergeOutcome<M> {
    /// Resulting timeline, falling back to `existing` when unchanged.
    #[must_use]
    pub fn into_messages(self, existing: &[M]) -> Vec<M> {
        match self {
            Self::Unchanged => existing.to_vec(),
            Self::Merged { messages, .. } => messages,
        }
    }
}

fn dedup_incoming<M, F>(existing: &[M], incoming: Vec<M>, key_fn: &F) -> Vec<M>
where
    F: Fn(&M) -> MessageKeys,
{
    let mut known = build_message_key_set(existing, key_fn);
    let mut accepted = Vec::with_capacity(incoming.len());

    for message in incoming {
        let keys = key_fn(&message);
        if is_message_duplicate(&keys, &known) {
            continue;
        }
        known.extend(keys);
        accepted.push(message);
    }

    accepted
}

/// Merges a batch known to be older than `existing` (backward pagination).
///
/// Only the deduplicated batch is sorted, then placed in front of `existing`.
#[must_use]
pub fn prepend_older_messages<M, F>(
    existing: &[M],
    incoming: Vec<M>,
    key_fn: F,
    max_count: usize,
) -> MergeOutcome<M>
where
    M: MessageView + Clone,
    F: Fn(&M) -> MessageKeys,
{
    let received = incoming.len();
    let mut new_messages = dedup_incoming(existing, incoming, &key_fn);
    if new_messages.is_empty() {
        trace!(received, "Older page contained only known messages");
        return MergeOutcome::Unchanged;
    }

    sort_messages_by_timestamp(&mut new_messages);

    let mut messages = Vec::with_capacity(new_messages.len() + existing.len());
    messages.extend_from_slice(&new_messages);
    messages.extend_from_slice(existing);
    trim_messages(&mut messages, max_count);

    trace!(received, accepted = new_messages.len(), "Prepended older messages");
    MergeOutcome::Merged {
        messages,
        new_messages,
    }
}

/// Merges a batch that may interleave with `existing` (forward catch-up,
/// cache loads, live delivery). Fully re-sorts the result.
#[must_use]
pub fn merge_and_process_messages<M, F>(
    existing: &[M],
    incoming: Vec<M>,
    key_fn: F,
    max_count: usize,
) -> MergeOutcome<M>
where
    M: MessageView + Clone,
    F: Fn(&M) -> MessageKeys,
{
    let received = incoming.len();
    let mut new_messages = dedup_incoming(existing, incoming, &key_fn);
    if new_messages.is_empty() {
        trace!(received, "Batch contained only known messages");
        return MergeOutcome::Unchanged;
    }

    sort_messages_by_timestamp(&mut new_messages);

    let mut messages = Vec::with_capacity(new_messages.len() + existing.len());
    messages.extend_from_slice(existing);
    messages.extend_from_slice(&new_messages);
    sort_messages_by_timestamp(&mut messages);
    trim_messages(&mut messages, max_count);

    trace!(received, accepted = new_messages.len(), "Merged messages");
    MergeOutcome::Merged {
        messages,
        new_messages,
    }
}
