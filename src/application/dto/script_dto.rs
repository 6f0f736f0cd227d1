//! Replay script events.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::PaginationDirection;
use crate::domain::entities::{EntityId, EntityKind, MessageId, NotificationMessage};

/// One line of a replay script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum ScriptEvent {
    Track {
        entity: EntityId,
        kind: EntityKind,
    },
    Live {
        entity: EntityId,
        message: NotificationMessage,
    },
    Page {
        entity: EntityId,
        direction: PaginationDirection,
        messages: Vec<NotificationMessage>,
    },
    Cache {
        entity: EntityId,
        direction: PaginationDirection,
        messages: Vec<NotificationMessage>,
    },
    Activate {
        entity: EntityId,
    },
    Deactivate,
    MarkRead {
        entity: EntityId,
    },
    Visibility {
        visible: bool,
    },
    Seen {
        entity: EntityId,
        message_id: MessageId,
    },
    ClearMarker {
        entity: EntityId,
    },
    Remove {
        entity: EntityId,
    },
    NotifyAll {
        entity: EntityId,
        value: bool,
    },
    PendingEvents {
        count: u32,
    },
    /// Scrolls the viewport of the active entity to a row offset.
    Scroll {
        offset: u32,
    },
    /// Lets timers run.
    Wait {
        ms: u64,
    },
}

impl ScriptEvent {
    /// Script name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Track { .. } => "track",
            Self::Live { .. } => "live",
            Self::Page { .. } => "page",
            Self::Cache { .. } => "cache",
            Self::Activate { .. } => "activate",
            Self::Deactivate => "deactivate",
            Self::MarkRead { .. } => "mark_read",
            Self::Visibility { .. } => "visibility",
            Self::Seen { .. } => "seen",
            Self::ClearMarker { .. } => "clear_marker",
            Self::Remove { .. } => "remove",
            Self::NotifyAll { .. } => "notify_all",
            Self::PendingEvents { .. } => "pending_events",
            Self::Scroll { .. } => "scroll",
            Self::Wait { .. } => "wait",
        }
    }

    /// Entity the event is about, if any.
    #[must_use]
    pub const fn entity(&self) -> Option<&EntityId> {
        match self {
            Self::Track { entity, .. }
            | Self::Live { entity, .. }
            | Self::Page { entity, .. }
            | Self::Cache { entity, .. }
            | Self::Activate { entity }
            | Self::MarkRead { entity }
            | Self::Seen { entity, .. }
            | Self::ClearMarker { entity }
            | Self::Remove { entity }
            | Self::NotifyAll { entity, .. } => Some(entity),
            Self::Deactivate
            | Self::Visibility { .. }
            | Self::PendingEvents { .. }
            | Self::Scroll { .. }
            | Self::Wait { .. } => None,
        }
    }
}

/// Malformed script line.
#[derive(Debug, Error)]
#[error("line {line}: {source}")]
pub struct ScriptParseError {
    /// 1-based line number.
    pub line: usize,
    /// Underlying JSON error.
    #[source]
    pub source: serde_json::Error,
}

/// Parses a JSON-lines script. Blank lines and lines starting with `#` are
/// skipped.
///
/// # Errors
/// Returns error for the first line that is not a valid event.
pub fn parse_script(input: &str) -> Result<Vec<ScriptEvent>, ScriptParseError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|source| ScriptParseError {
                line: index + 1,
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_script_skips_comments() {
        let script = r#"
# setup
{"type":"track","entity":"alice","kind":"conversation"}

{"type":"live","entity":"alice","message":{"id":"m1","sender":"alice","timestamp":"2026-01-01T10:00:00Z"}}
{"type":"deactivate"}
"#;

        let events = parse_script(script).unwrap();

        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            ScriptEvent::Track {
                entity: EntityId::from("alice"),
                kind: EntityKind::Conversation,
            }
        );
        let ScriptEvent::Live { message, .. } = &events[1] else {
            panic!("expected live event");
        };
        assert_eq!(message.id, MessageId::from("m1"));
        assert!(!message.is_delayed);
        assert_eq!(events[2], ScriptEvent::Deactivate);
        assert_eq!(events[2].entity(), None);
    }

    #[test]
    fn test_parse_script_reports_line() {
        let script = "{\"type\":\"deactivate\"}\n{\"type\":\"bogus\"}\n";

        let err = parse_script(script).unwrap_err();

        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_page_direction_is_lowercase() {
        let event: ScriptEvent = serde_json::from_str(
            r#"{"type":"page","entity":"room","direction":"backward","messages":[]}"#,
        )
        .unwrap();

        assert!(matches!(
            event,
            ScriptEvent::Page {
                direction: PaginationDirection::Backward,
                ..
            }
        ));
    }
}
