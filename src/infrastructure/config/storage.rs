use super::app_config::AppConfig;
use super::read_positions::ReadPositions;
use directories::ProjectDirs;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "linuxmobile";
const APP_NAME: &str = "readmark";
const CONFIG_FILE_NAME: &str = "config.toml";
const READ_POSITIONS_FILE_NAME: &str = "read_positions.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to determine config directory")]
    ConfigDirNotFound,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("toml serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("toml deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

pub struct StorageManager {
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl StorageManager {
    /// Create a new `StorageManager`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration directory cannot be determined.
    pub fn new() -> Result<Self, ConfigError> {
        let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .ok_or(ConfigError::ConfigDirNotFound)?;

        Ok(Self {
            config_dir: dirs.config_dir().to_path_buf(),
            data_dir: dirs.data_dir().to_path_buf(),
        })
    }

    /// Creates a new `StorageManager` keeping everything in one directory (useful for testing).
    #[must_use]
    pub fn with_dir(path: PathBuf) -> Self {
        Self {
            data_dir: path.clone(),
            config_dir: path,
        }
    }

    /// Replaces the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: PathBuf) -> Self {
        self.data_dir = path;
        self
    }

    /// Returns the configuration directory path.
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Returns the data directory path.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Ensures the configuration directory exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the directory cannot be created.
    pub fn ensure_config_dir(&self) -> Result<(), ConfigError> {
        Self::ensure_dir(&self.config_dir)
    }

    fn ensure_dir(dir: &Path) -> Result<(), ConfigError> {
        if !dir.exists() {
            info!("Creating directory at {:?}", dir);
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Loads the application configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn load_config(&self, path_override: Option<&Path>) -> Result<AppConfig, ConfigError> {
        self.ensure_config_dir()?;
        let config_path = path_override.map_or_else(
            || self.config_dir.join(CONFIG_FILE_NAME),
            std::path::Path::to_path_buf,
        );

        if !config_path.exists() {
            info!(
                "Config file not found at {:?}, creating default.",
                config_path
            );
            let default_config = AppConfig::default();
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
            }
            Self::save_to_file(&config_path, &default_config)?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&config_path)?;
        match toml::from_str::<AppConfig>(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                warn!("Failed to parse config file: {}. Using defaults.", e);
                Ok(AppConfig::default())
            }
        }
    }

    /// Loads the persisted read positions.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read.
    pub fn load_read_positions(&self) -> Result<ReadPositions, ConfigError> {
        let path = self.data_dir.join(READ_POSITIONS_FILE_NAME);

        if !path.exists() {
            return Ok(ReadPositions::default());
        }

        let content = fs::read_to_string(&path)?;
        match toml::from_str::<ReadPositions>(&content) {
            Ok(positions) => Ok(positions),
            Err(e) => {
                warn!("Failed to parse read positions: {}. Starting empty.", e);
                Ok(ReadPositions::default())
            }
        }
    }

    /// Saves the read positions.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be written.
    pub fn save_read_positions(&self, positions: &ReadPositions) -> Result<(), ConfigError> {
        Self::ensure_dir(&self.data_dir)?;
        let path = self.data_dir.join(READ_POSITIONS_FILE_NAME);
        Self::save_to_file(&path, positions)
    }

    fn save_to_file<T: serde::Serialize>(path: &Path, data: &T) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(data)?;

        let parent = path
            .parent()
            .ok_or_else(|| std::io::Error::other("Invalid path"))?;
        let mut temp_file = tempfile::NamedTempFile::new_in(parent)?;
        temp_file.write_all(content.as_bytes())?;
        temp_file.persist(path).map_err(|e| e.error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{EntityId, MessageId};
    use tempfile::tempdir;

    #[test]
    fn test_ensure_config_dir_creates_directory() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("readmark");
        let manager = StorageManager::with_dir(config_path.clone());

        assert!(!config_path.exists());
        manager.ensure_config_dir().unwrap();
        assert!(config_path.exists());
    }

    #[test]
    fn test_load_config_creates_default_if_missing() {
        let dir = tempdir().unwrap();
        let manager = StorageManager::with_dir(dir.path().to_path_buf());

        let config = manager.load_config(None).unwrap();
        assert_eq!(config.timeline.max_retained_messages, 200);

        let config_file = dir.path().join(CONFIG_FILE_NAME);
        assert!(config_file.exists());
    }

    #[test]
    fn test_load_config_handles_malformed_file() {
        let dir = tempdir().unwrap();
        let manager = StorageManager::with_dir(dir.path().to_path_buf());
        let config_file = dir.path().join(CONFIG_FILE_NAME);

        fs::write(&config_file, "invalid_toml = [").unwrap();

        let config = manager.load_config(None).unwrap();
        assert_eq!(config.viewport.throttle_ms, 300);
        let content = fs::read_to_string(&config_file).unwrap();
        assert_eq!(content, "invalid_toml = [");
    }

    #[test]
    fn test_save_and_load_read_positions() {
        let dir = tempdir().unwrap();
        let manager = StorageManager::with_dir(dir.path().join("config"))
            .with_data_dir(dir.path().join("data"));

        let mut positions = ReadPositions::default();
        assert!(positions.set(EntityId::from("alice"), MessageId::from("m3")));
        assert!(!positions.set(EntityId::from("alice"), MessageId::from("m3")));

        manager.save_read_positions(&positions).unwrap();

        assert!(dir.path().join("data").join(READ_POSITIONS_FILE_NAME).exists());
        let loaded = manager.load_read_positions().unwrap();
        assert_eq!(
            loaded.get(&EntityId::from("alice")),
            Some(&MessageId::from("m3"))
        );
    }

    #[test]
    fn test_missing_read_positions_are_empty() {
        let dir = tempdir().unwrap();
        let manager = StorageManager::with_dir(dir.path().to_path_buf());

        let loaded = manager.load_read_positions().unwrap();

        assert_eq!(loaded, ReadPositions::default());
    }

    #[test]
    fn test_malformed_read_positions_are_reset() {
        let dir = tempdir().unwrap();
        let manager = StorageManager::with_dir(dir.path().to_path_buf());
        fs::write(dir.path().join(READ_POSITIONS_FILE_NAME), "positions = 3").unwrap();

        let loaded = manager.load_read_positions().unwrap();

        assert!(loaded.positions.is_empty());
    }
}
