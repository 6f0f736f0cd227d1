//! Infrastructure layer with storage, cache and layout adapters.

/// Message cache adapters.
pub mod cache;
/// Application configuration.
pub mod config;
/// Read position storage adapters.
pub mod storage;
/// Viewport observation adapters.
pub mod viewport;

pub use cache::MemoryMessageCache;
pub use config::{AppConfig, CliArgs, ConfigError, LogLevel, StorageManager};
pub use storage::TomlReadPositionStore;
pub use viewport::LayoutViewport;
