//! Application configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::application::services::TrackerConfig;
use crate::application::use_cases::{DEFAULT_MAX_RETAINED_MESSAGES, StoreSettings};

const APP_NAME: &str = "readmark";
const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "linuxmobile";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Timeline configuration.
    #[serde(default)]
    pub timeline: TimelineConfig,

    /// Viewport tracking configuration.
    #[serde(default)]
    pub viewport: ViewportConfig,

    /// Notification configuration.
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

/// Timeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineConfig {
    /// Messages kept in memory per entity.
    #[serde(default = "default_max_retained_messages")]
    pub max_retained_messages: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            max_retained_messages: default_max_retained_messages(),
        }
    }
}

/// Viewport tracking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewportConfig {
    /// Minimum delay between two seen reports, in milliseconds.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// Visible fraction above which a message counts as visible.
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f64,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            throttle_ms: default_throttle_ms(),
            visibility_threshold: default_visibility_threshold(),
        }
    }
}

/// Notification configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Notify for every room message, not only mentions, unless a room
    /// says otherwise.
    #[serde(default)]
    pub notify_all: bool,
}

const fn default_max_retained_messages() -> usize {
    DEFAULT_MAX_RETAINED_MESSAGES
}

const fn default_throttle_ms() -> u64 {
    300
}

const fn default_visibility_threshold() -> f64 {
    0.5
}

use super::args::CliArgs;

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(max_retained) = args.max_retained_messages {
            self.timeline.max_retained_messages = max_retained;
        }
        if let Some(throttle_ms) = args.throttle_ms {
            self.viewport.throttle_ms = throttle_ms;
        }
        if let Some(threshold) = args.visibility_threshold {
            self.viewport.visibility_threshold = threshold;
        }
        if let Some(notify_all) = args.notify_all {
            self.notifications.notify_all = notify_all;
        }
    }

    /// Store settings derived from this configuration.
    #[must_use]
    pub const fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            max_retained_messages: self.timeline.max_retained_messages,
            notify_all_default: self.notifications.notify_all,
        }
    }

    /// Viewport tracker configuration derived from this configuration.
    /// Thresholds outside `0.0..1.0` are clamped.
    #[must_use]
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            throttle: Duration::from_millis(self.viewport.throttle_ms),
            visibility_threshold: self.viewport.visibility_threshold.clamp(0.0, 1.0),
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns default data directory, where read positions live.
    #[must_use]
    pub fn default_data_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        Self::default_data_dir().map(|dir| dir.join("readmark.log"))
    }

    /// Returns effective config path.
    #[must_use]
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Self::default_config_path)
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config: None,
            log_path: None,
            log_level: LogLevel::Info,
            timeline: TimelineConfig::default(),
            viewport: ViewportConfig::default(),
            notifications: NotificationsConfig::default(),
        }
    }
}
