//! TOML-file read position storage.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::entities::{EntityId, MessageId};
use crate::domain::errors::PersistenceError;
use crate::domain::ports::ReadPositionStorePort;
use crate::infrastructure::config::{ConfigError, ReadPositions, StorageManager};

/// Read position store backed by `read_positions.toml`.
///
/// Positions are loaded once; every change rewrites the file atomically.
pub struct TomlReadPositionStore {
    storage: Arc<StorageManager>,
    positions: Mutex<ReadPositions>,
}

impl TomlReadPositionStore {
    /// Opens the store, loading existing positions.
    ///
    /// # Errors
    /// Returns error if the positions file exists but cannot be read.
    pub fn open(storage: Arc<StorageManager>) -> Result<Self, ConfigError> {
        let positions = storage.load_read_positions()?;
        debug!(count = positions.positions.len(), "Loaded read positions");
        Ok(Self {
            storage,
            positions: Mutex::new(positions),
        })
    }

    async fn persist(&self, snapshot: ReadPositions) -> Result<(), PersistenceError> {
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || storage.save_read_positions(&snapshot))
            .await
            .map_err(|e| PersistenceError::StoreFailed(e.to_string()))?
            .map_err(|e| {
                warn!(error = %e, "Failed to write read positions");
                PersistenceError::StoreFailed(e.to_string())
            })
    }
}

#[async_trait]
impl ReadPositionStorePort for TomlReadPositionStore {
    async fn load_last_seen(
        &self,
        entity: &EntityId,
    ) -> Result<Option<MessageId>, PersistenceError> {
        Ok(self.positions.lock().await.get(entity).cloned())
    }

    async fn save_last_seen(
        &self,
        entity: &EntityId,
        message_id: &MessageId,
    ) -> Result<(), PersistenceError> {
        let mut positions = self.positions.lock().await;
        if !positions.set(entity.clone(), message_id.clone()) {
            return Ok(());
        }
        debug!(entity = %entity, message_id = %message_id, "Saving read position");
        self.persist(positions.clone()).await
    }

    async fn remove(&self, entity: &EntityId) -> Result<(), PersistenceError> {
        let mut positions = self.positions.lock().await;
        if !positions.remove(entity) {
            return Ok(());
        }
        self.persist(positions.clone()).await
    }
}
