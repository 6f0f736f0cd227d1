use serde::{Deserialize, Serialize};

/// Room "notify on every message" preference.
///
/// A session override beats the persisted value, which beats the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyAllPreference {
    /// Set for the current session only.
    #[serde(skip)]
    pub session_override: Option<bool>,
    /// Stored with the room bookmark.
    #[serde(default)]
    pub persisted: Option<bool>,
}

impl NotifyAllPreference {
    /// Preference backed by a persisted value.
    #[must_use]
    pub const fn persisted(value: bool) -> Self {
        Self {
            session_override: None,
            persisted: Some(value),
        }
    }

    /// Replaces the session override.
    #[must_use]
    pub const fn with_session_override(mut self, value: Option<bool>) -> Self {
        self.session_override = value;
        self
    }

    /// Resolves the effective setting.
    #[must_use]
    pub fn resolve(self, default: bool) -> bool {
        self.session_override.or(self.persisted).unwrap_or(default)
    }
}
