//! In-memory LRU message cache implementation.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::application::services::timeline_merger::{merge_and_process_messages, message_keys};
use crate::domain::entities::{EntityId, NotificationMessage};
use crate::domain::errors::PersistenceError;
use crate::domain::ports::{HistoryQuery, MessageCachePort};

/// Default number of entities whose history is kept.
pub const DEFAULT_CACHED_ENTITIES: usize = 64;

/// Default number of messages kept per entity.
pub const DEFAULT_MESSAGES_PER_ENTITY: usize = 1000;

/// In-memory history cache. Least recently used entities are evicted first.
pub struct MemoryMessageCache {
    cache: Arc<RwLock<LruCache<EntityId, Vec<NotificationMessage>>>>,
    messages_per_entity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryMessageCache {
    /// Creates a new cache with the specified capacities.
    #[must_use]
    pub fn new(entities: usize, messages_per_entity: usize) -> Self {
        let cap = NonZeroUsize::new(entities).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(RwLock::new(LruCache::new(cap))),
            messages_per_entity: messages_per_entity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates a new cache with the default capacities.
    #[must_use]
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CACHED_ENTITIES, DEFAULT_MESSAGES_PER_ENTITY)
    }

    /// Returns `(hits, misses)` of history loads.
    #[must_use]
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    /// Number of cached messages of an entity, without promoting it.
    pub async fn cached_len(&self, entity: &EntityId) -> usize {
        self.cache.read().await.peek(entity).map_or(0, Vec::len)
    }
}

impl Default for MemoryMessageCache {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

fn select(messages: &[NotificationMessage], query: HistoryQuery) -> Vec<NotificationMessage> {
    let matching = messages
        .iter()
        .filter(|m| query.before.is_none_or(|ts| m.timestamp < ts))
        .filter(|m| query.after.is_none_or(|ts| m.timestamp > ts));

    if query.after.is_some() && query.before.is_none() {
        return matching.take(query.limit).cloned().collect();
    }

    let mut batch: Vec<_> = matching.cloned().collect();
    let excess = batch.len().saturating_sub(query.limit);
    batch.drain(..excess);
    batch
}

#[async_trait]
impl MessageCachePort for MemoryMessageCache {
    async fn load(
        &self,
        entity: &EntityId,
        query: HistoryQuery,
    ) -> Result<Vec<NotificationMessage>, PersistenceError> {
        let mut cache = self.cache.write().await;
        let Some(messages) = cache.get(entity) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(entity = %entity, "Message cache miss");
            return Ok(Vec::new());
        };
        self.hits.fetch_add(1, Ordering::Relaxed);
        let batch = select(messages, query);
        trace!(entity = %entity, count = batch.len(), "Message cache hit");
        Ok(batch)
    }

    async fn store(
        &self,
        entity: &EntityId,
        messages: &[NotificationMessage],
    ) -> Result<(), PersistenceError> {
        let mut cache = self.cache.write().await;
        let existing = cache.pop(entity).unwrap_or_default();
        let outcome = merge_and_process_messages(
            &existing,
            messages.to_vec(),
            message_keys,
            self.messages_per_entity,
        );
        debug!(entity = %entity, stored = outcome.new_count(), "Cached messages");
        cache.put(entity.clone(), outcome.into_messages(&existing));
        Ok(())
    }

    async fn clear(&self, entity: &EntityId) -> Result<(), PersistenceError> {
        if self.cache.write().await.pop(entity).is_some() {
            debug!(entity = %entity, "Cleared cached messages");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta, Utc};

    fn base() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn msg(id: &str, minute: i64) -> NotificationMessage {
        NotificationMessage::new(id, "bob", base() + TimeDelta::minutes(minute))
    }

    fn history() -> Vec<NotificationMessage> {
        (0..6).map(|i| msg(&format!("m{i}"), i)).collect()
    }

    fn ids(messages: &[NotificationMessage]) -> Vec<&str> {
        messages.iter().map(|m| m.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_store_and_load_latest() {
        let cache = MemoryMessageCache::new(4, 100);
        let alice = EntityId::from("alice");
        cache.store(&alice, &history()).await.unwrap();

        let batch = cache.load(&alice, HistoryQuery::latest(2)).await.unwrap();

        assert_eq!(ids(&batch), vec!["m4", "m5"]);
        assert_eq!(cache.stats(), (1, 0));
    }

    #[tokio::test]
    async fn test_load_before_and_after() {
        let cache = MemoryMessageCache::new(4, 100);
        let alice = EntityId::from("alice");
        cache.store(&alice, &history()).await.unwrap();
        let pivot = base() + TimeDelta::minutes(3);

        let older = cache
            .load(&alice, HistoryQuery::before(pivot, 2))
            .await
            .unwrap();
        let newer = cache
            .load(&alice, HistoryQuery::after(pivot, 1))
            .await
            .unwrap();

        assert_eq!(ids(&older), vec!["m1", "m2"]);
        assert_eq!(ids(&newer), vec!["m4"]);
    }

    #[tokio::test]
    async fn test_store_deduplicates_and_trims() {
        let cache = MemoryMessageCache::new(4, 4);
        let alice = EntityId::from("alice");
        cache.store(&alice, &history()[..3]).await.unwrap();

        cache.store(&alice, &history()[1..]).await.unwrap();

        let batch = cache.load(&alice, HistoryQuery::latest(10)).await.unwrap();
        assert_eq!(ids(&batch), vec!["m2", "m3", "m4", "m5"]);
    }

    #[tokio::test]
    async fn test_least_recent_entity_is_evicted() {
        let cache = MemoryMessageCache::new(2, 100);
        for name in ["a", "b", "c"] {
            cache
                .store(&EntityId::from(name), &history()[..1])
                .await
                .unwrap();
        }

        assert_eq!(cache.cached_len(&EntityId::from("a")).await, 0);
        assert_eq!(cache.cached_len(&EntityId::from("c")).await, 1);
    }

    #[test]
    fn test_clear_and_miss() {
        let cache = MemoryMessageCache::with_default_capacity();
        let alice = EntityId::from("alice");

        tokio_test::block_on(async {
            cache.store(&alice, &history()).await.unwrap();
            cache.clear(&alice).await.unwrap();
            let batch = cache.load(&alice, HistoryQuery::latest(10)).await.unwrap();
            assert!(batch.is_empty());
        });

        assert_eq!(cache.stats(), (0, 1));
    }
}
