//! Read position storage port definition.

use async_trait::async_trait;

use crate::domain::entities::{EntityId, MessageId};
use crate::domain::errors::PersistenceError;

/// Port for durable `last_seen_message_id` storage.
///
/// The last seen position is the one piece of read state expected to
/// survive an application restart.
#[async_trait]
pub trait ReadPositionStorePort: Send + Sync {
    /// Loads the stored position for an entity.
    async fn load_last_seen(&self, entity: &EntityId)
    -> Result<Option<MessageId>, PersistenceError>;

    /// Stores the position for an entity.
    async fn save_last_seen(
        &self,
        entity: &EntityId,
        message_id: &MessageId,
    ) -> Result<(), PersistenceError>;

    /// Forgets the position for an entity.
    async fn remove(&self, entity: &EntityId) -> Result<(), PersistenceError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// In-memory read position storage for testing.
    #[derive(Default)]
    pub struct MockReadPositionStore {
        pub positions: Arc<RwLock<HashMap<EntityId, MessageId>>>,
    }

    impl MockReadPositionStore {
        /// Creates empty mock storage.
        pub fn new() -> Self {
            Self::default()
        }

        /// Creates mock storage with one stored position.
        pub fn with_position(entity: &str, message_id: &str) -> Self {
            let mut positions = HashMap::new();
            positions.insert(EntityId::new(entity), MessageId::new(message_id));
            Self {
                positions: Arc::new(RwLock::new(positions)),
            }
        }

        /// Returns the stored position for an entity.
        pub async fn stored(&self, entity: &str) -> Option<MessageId> {
            self.positions
                .read()
                .await
                .get(&EntityId::new(entity))
                .cloned()
        }
    }

    #[async_trait]
    impl ReadPositionStorePort for MockReadPositionStore {
        async fn load_last_seen(
            &self,
            entity: &EntityId,
        ) -> Result<Option<MessageId>, PersistenceError> {
            Ok(self.positions.read().await.get(entity).cloned())
        }

        async fn save_last_seen(
            &self,
            entity: &EntityId,
            message_id: &MessageId,
        ) -> Result<(), PersistenceError> {
            self.positions
                .write()
                .await
                .insert(entity.clone(), message_id.clone());
            Ok(())
        }

        async fn remove(&self, entity: &EntityId) -> Result<(), PersistenceError> {
            self.positions.write().await.remove(entity);
            Ok(())
        }
    }
}
