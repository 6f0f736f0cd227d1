use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message identifier assigned by the sending client.
///
/// Only unique per sender; pair it with a [`SenderId`] for a global identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Creates a message id.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Globally unique identifier assigned by the server-side archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchiveId(String);

impl ArchiveId {
    /// Creates an archive id.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address of a message author (a user address or a room occupant).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenderId(String);

impl SenderId {
    /// Creates a sender id.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SenderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SenderId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Read-only view over a chat message, enough for timeline merging and
/// read-state decisions.
///
/// Flags are resolved upstream by the protocol layer; nothing here parses
/// delayed-delivery or mention markup.
pub trait MessageView {
    /// Locally assigned message id.
    fn id(&self) -> &MessageId;
    /// Author of the message.
    fn sender(&self) -> &SenderId;
    /// Server archive id, when the message went through the archive.
    fn archive_id(&self) -> Option<&ArchiveId>;
    /// Time the message was sent.
    fn timestamp(&self) -> DateTime<Utc>;
    /// Sent by the local user.
    fn is_outgoing(&self) -> bool;
    /// Historical or offline replay rather than a live event.
    fn is_delayed(&self) -> bool;
    /// Mentions the local user. Always false outside rooms.
    fn is_mention(&self) -> bool;
}

/// Chat message as seen by the read-state engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessage {
    /// Locally assigned id.
    pub id: MessageId,
    /// Server archive id.
    #[serde(default)]
    pub archive_id: Option<ArchiveId>,
    /// Author.
    pub sender: SenderId,
    /// Send time.
    pub timestamp: DateTime<Utc>,
    /// Sent by the local user.
    #[serde(default)]
    pub is_outgoing: bool,
    /// Historical or offline replay.
    #[serde(default)]
    pub is_delayed: bool,
    /// Mentions the local user.
    #[serde(default)]
    pub is_mention: bool,
}

impl NotificationMessage {
    /// Creates an incoming, live, non-mention message.
    #[must_use]
    pub fn new(
        id: impl Into<MessageId>,
        sender: impl Into<SenderId>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            archive_id: None,
            sender: sender.into(),
            timestamp,
            is_outgoing: false,
            is_delayed: false,
            is_mention: false,
        }
    }

    /// Sets the archive id.
    #[must_use]
    pub fn with_archive_id(mut self, archive_id: impl Into<String>) -> Self {
        self.archive_id = Some(ArchiveId::new(archive_id));
        self
    }

    /// Marks the message as sent by the local user.
    #[must_use]
    pub const fn outgoing(mut self) -> Self {
        self.is_outgoing = true;
        self
    }

    /// Marks the message as a delayed delivery.
    #[must_use]
    pub const fn delayed(mut self) -> Self {
        self.is_delayed = true;
        self
    }

    /// Marks the message as mentioning the local user.
    #[must_use]
    pub const fn mentioning(mut self) -> Self {
        self.is_mention = true;
        self
    }
}

impl MessageView for NotificationMessage {
    fn id(&self) -> &MessageId {
        &self.id
    }

    fn sender(&self) -> &SenderId {
        &self.sender
    }

    fn archive_id(&self) -> Option<&ArchiveId> {
        self.archive_id.as_ref()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn is_outgoing(&self) -> bool {
        self.is_outgoing
    }

    fn is_delayed(&self) -> bool {
        self.is_delayed
    }

    fn is_mention(&self) -> bool {
        self.is_mention
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_builder_flags() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let msg = NotificationMessage::new("m1", "alice@example.org", ts)
            .with_archive_id("arch-1")
            .delayed()
            .mentioning();

        assert_eq!(msg.id().as_str(), "m1");
        assert_eq!(msg.archive_id().map(ArchiveId::as_str), Some("arch-1"));
        assert!(!msg.is_outgoing());
        assert!(msg.is_delayed());
        assert!(msg.is_mention());
    }

    #[test]
    fn test_deserialize_defaults_flags() {
        let json = r#"{"id":"m1","sender":"bob@example.org","timestamp":"2024-05-01T09:00:00Z"}"#;
        let msg: NotificationMessage = serde_json::from_str(json).unwrap();

        assert_eq!(msg.sender.as_str(), "bob@example.org");
        assert!(msg.archive_id.is_none());
        assert!(!msg.is_outgoing && !msg.is_delayed && !msg.is_mention);
    }
}
