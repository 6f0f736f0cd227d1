//! Application configuration.

pub mod app_config;
pub mod args;
pub mod read_positions;
pub mod storage;

pub use app_config::{
    AppConfig, LogLevel, NotificationsConfig, TimelineConfig, ViewportConfig,
};
pub use args::CliArgs;
pub use read_positions::ReadPositions;
pub use storage::{ConfigError, StorageManager};
