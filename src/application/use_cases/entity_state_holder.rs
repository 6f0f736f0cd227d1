//! Entity state holder use case.
//!
//! Owns the read state and timeline of every tracked conversation and room,
//! routes events through the notification state machine and the timeline
//! merger, and publishes a [`StoreSnapshot`] whenever something changed.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::application::dto::{
    IngestReport, MessageSource, NotifyDecision, PaginationDirection, StoreSnapshot,
};
use crate::application::services::notification_state_machine::{
    on_activate, on_clear_marker, on_deactivate, on_mark_as_read, on_message_received,
    on_message_seen, on_window_became_visible, should_notify_conversation, should_notify_room,
};
use crate::application::services::timeline_merger::{
    MergeOutcome, merge_and_process_messages, message_keys, prepend_older_messages,
};
use crate::application::services::{
    BadgeSources, ReceiveOptions, SharedState, VersionedMemo, compute_badge_count,
};
use crate::domain::entities::{
    EntityContext, EntityId, EntityKind, EntityNotificationState, MessageId, MessageView,
    NotificationMessage, NotifyAllPreference,
};
use crate::domain::errors::EntityError;
use crate::domain::ports::{HistoryQuery, MessageCachePort, ReadPositionStorePort};

/// Default number of messages kept in memory per entity.
pub const DEFAULT_MAX_RETAINED_MESSAGES: usize = 200;

/// Store-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSettings {
    /// Timeline length after trimming.
    pub max_retained_messages: usize,
    /// Room notify-all value when neither a session nor a persisted
    /// preference exists.
    pub notify_all_default: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_retained_messages: DEFAULT_MAX_RETAINED_MESSAGES,
            notify_all_default: false,
        }
    }
}

/// Everything held for one entity.
#[derive(Debug, Clone)]
pub struct EntityRecord {
    /// Conversation or room.
    pub kind: EntityKind,
    /// Current read state.
    pub state: SharedState,
    /// In-memory timeline, ascending by timestamp.
    pub timeline: Vec<NotificationMessage>,
    /// Room notify-all preference.
    pub notify_all: NotifyAllPreference,
    /// Store version of the last change to this record.
    pub version: u64,
}

impl EntityRecord {
    fn new(kind: EntityKind, last_seen: Option<MessageId>) -> Self {
        Self {
            kind,
            state: Arc::new(EntityNotificationState::new().with_last_seen(last_seen)),
            timeline: Vec::new(),
            notify_all: NotifyAllPreference::default(),
            version: 0,
        }
    }

    fn last_timestamp(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.timeline.last().map(MessageView::timestamp)
    }
}

/// Holds the read state of all tracked entities.
pub struct EntityStore {
    cache: Arc<dyn MessageCachePort>,
    positions: Arc<dyn ReadPositionStorePort>,
    settings: StoreSettings,
    entities: HashMap<EntityId, EntityRecord>,
    active: Option<EntityId>,
    window_visible: bool,
    pending_events: u32,
    version: u64,
    snapshot_tx: watch::Sender<StoreSnapshot>,
}

impl EntityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(
        cache: Arc<dyn MessageCachePort>,
        positions: Arc<dyn ReadPositionStorePort>,
        settings: StoreSettings,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(StoreSnapshot::default());
        Self {
            cache,
            positions,
            settings,
            entities: HashMap::new(),
            active: None,
            window_visible: true,
            pending_events: 0,
            version: 0,
            snapshot_tx,
        }
    }

    /// Subscribes to store snapshots.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Current store version.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Currently active entity.
    #[must_use]
    pub const fn active(&self) -> Option<&EntityId> {
        self.active.as_ref()
    }

    /// Whether the application window is visible.
    #[must_use]
    pub const fn window_visible(&self) -> bool {
        self.window_visible
    }

    /// Read state of an entity.
    #[must_use]
    pub fn state(&self, entity: &EntityId) -> Option<SharedState> {
        self.entities.get(entity).map(|record| Arc::clone(&record.state))
    }

    /// Timeline of an entity.
    #[must_use]
    pub fn timeline(&self, entity: &EntityId) -> Option<&[NotificationMessage]> {
        self.entities.get(entity).map(|record| record.timeline.as_slice())
    }

    /// Full record of an entity.
    #[must_use]
    pub fn record(&self, entity: &EntityId) -> Option<&EntityRecord> {
        self.entities.get(entity)
    }

    /// Tracked entity ids, unordered.
    pub fn entity_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.entities.keys()
    }

    /// Starts tracking an entity, restoring its persisted read position.
    ///
    /// # Errors
    /// Returns error if the entity is already tracked.
    pub async fn track(&mut self, entity: EntityId, kind: EntityKind) -> Result<(), EntityError> {
        if self.entities.contains_key(&entity) {
            return Err(EntityError::already_tracked(&entity));
        }

        let last_seen = match self.positions.load_last_seen(&entity).await {
            Ok(position) => position,
            Err(e) => {
                warn!(entity = %entity, error = %e, "Failed to load read position");
                None
            }
        };

        info!(entity = %entity, kind = %kind, restored = last_seen.is_some(), "Tracking entity");
        self.entities.insert(entity, EntityRecord::new(kind, last_seen));
        self.bump();
        Ok(())
    }

    /// Stops tracking an entity and forgets its persisted data.
    ///
    /// # Errors
    /// Returns error if the entity is unknown or its read position could
    /// not be removed. In-memory state is dropped either way.
    pub async fn remove(&mut self, entity: &EntityId) -> Result<(), EntityError> {
        self.entities
            .remove(entity)
            .ok_or_else(|| EntityError::unknown(entity))?;
        if self.active.as_ref() == Some(entity) {
            self.active = None;
        }
        self.bump();
        info!(entity = %entity, "Removed entity");

        if let Err(e) = self.cache.clear(entity).await {
            warn!(entity = %entity, error = %e, "Failed to clear message cache");
        }
        self.positions.remove(entity).await?;
        Ok(())
    }

    /// Applies a message delivered live by the transport.
    ///
    /// # Errors
    /// Returns error if the entity is unknown.
    pub async fn apply_live(
        &mut self,
        entity: &EntityId,
        message: NotificationMessage,
    ) -> Result<IngestReport, EntityError> {
        self.ingest(entity, vec![message], MessageSource::Live).await
    }

    /// Applies a history page fetched from the server.
    ///
    /// # Errors
    /// Returns error if the entity is unknown.
    pub async fn apply_page(
        &mut self,
        entity: &EntityId,
        direction: PaginationDirection,
        messages: Vec<NotificationMessage>,
    ) -> Result<IngestReport, EntityError> {
        self.ingest(entity, messages, MessageSource::Page(direction))
            .await
    }

    /// Applies a batch read from the local cache.
    ///
    /// # Errors
    /// Returns error if the entity is unknown.
    pub async fn apply_cache_batch(
        &mut self,
        entity: &EntityId,
        direction: PaginationDirection,
        messages: Vec<NotificationMessage>,
    ) -> Result<IngestReport, EntityError> {
        self.ingest(entity, messages, MessageSource::Cache(direction))
            .await
    }

    /// Reads a batch from the cache and merges it.
    ///
    /// # Errors
    /// Returns error if the entity is unknown or the cache read fails.
    pub async fn load_cached_history(
        &mut self,
        entity: &EntityId,
        query: HistoryQuery,
    ) -> Result<IngestReport, EntityError> {
        if !self.entities.contains_key(entity) {
            return Err(EntityError::unknown(entity));
        }
        let direction = if query.before.is_some() {
            PaginationDirection::Backward
        } else {
            PaginationDirection::Forward
        };
        let messages = self.cache.load(entity, query).await?;
        debug!(entity = %entity, count = messages.len(), "Loaded cached history");
        self.apply_cache_batch(entity, direction, messages).await
    }

    async fn ingest(
        &mut self,
        entity: &EntityId,
        batch: Vec<NotificationMessage>,
        source: MessageSource,
    ) -> Result<IngestReport, EntityError> {
        let ctx = self.context_for(entity);
        let notify_all_default = self.settings.notify_all_default;
        let max_count = self.settings.max_retained_messages;
        let record = self
            .entities
            .get_mut(entity)
            .ok_or_else(|| EntityError::unknown(entity))?;

        let outcome = match source.direction() {
            PaginationDirection::Backward => {
                prepend_older_messages(&record.timeline, batch, message_keys, max_count)
            }
            PaginationDirection::Forward => {
                merge_and_process_messages(&record.timeline, batch, message_keys, max_count)
            }
        };
        let MergeOutcome::Merged {
            messages,
            new_messages,
        } = outcome
        else {
            return Ok(IngestReport::duplicates_only());
        };
        record.timeline = messages;

        let previous = Arc::clone(&record.state);
        let mut notification = None;
        let received = if source.updates_read_state() {
            new_messages.as_slice()
        } else {
            &[]
        };
        for message in received {
            let options = ReceiveOptions {
                increment_unread: true,
                increment_mentions: record.kind.tracks_mentions() && message.is_mention,
                treat_delayed_as_new: source == MessageSource::Live
                    && record.kind == EntityKind::Conversation,
            };
            record.state = on_message_received(&record.state, message, ctx, options);

            if source == MessageSource::Live {
                let decision = match record.kind {
                    EntityKind::Conversation => should_notify_conversation(message, ctx)
                        .then_some(NotifyDecision::Conversation),
                    EntityKind::Room => {
                        let notify_all = record.notify_all.resolve(notify_all_default);
                        let decision = should_notify_room(message, ctx, notify_all);
                        decision.notify.then_some(NotifyDecision::Room {
                            is_mention: decision.is_mention,
                        })
                    }
                };
                notification = decision.or(notification);
            }
        }
        let state_changed = !Arc::ptr_eq(&previous, &record.state);

        debug!(
            entity = %entity,
            ?source,
            accepted = new_messages.len(),
            state_changed,
            "Ingested messages"
        );
        self.bump_entity(entity);

        if source.persists_to_cache()
            && let Err(e) = self.cache.store(entity, &new_messages).await
        {
            warn!(entity = %entity, error = %e, "Failed to cache messages");
        }

        Ok(IngestReport {
            accepted: new_messages.len(),
            state_changed,
            notification,
        })
    }

    /// Makes an entity active, deactivating the previous one.
    ///
    /// # Errors
    /// Returns error if the entity is unknown or the advanced read position
    /// could not be persisted. In-memory state is updated either way.
    pub async fn activate(&mut self, entity: &EntityId) -> Result<(), EntityError> {
        if !self.entities.contains_key(entity) {
            return Err(EntityError::unknown(entity));
        }
        if let Some(previous) = self.active.take()
            && previous != *entity
        {
            self.update_state(&previous, on_deactivate);
        }
        self.active = Some(entity.clone());

        let advanced = self.transition(entity, |state, timeline| on_activate(state, timeline))?;
        debug!(entity = %entity, "Activated entity");
        self.bump();
        if let Some(message_id) = advanced {
            self.positions.save_last_seen(entity, &message_id).await?;
        }
        Ok(())
    }

    /// Deactivates the active entity, if any.
    pub fn deactivate(&mut self) {
        if let Some(previous) = self.active.take() {
            self.update_state(&previous, on_deactivate);
            debug!(entity = %previous, "Deactivated entity");
            self.bump();
        }
    }

    /// Marks an entity as read up to its last message.
    ///
    /// # Errors
    /// Returns error if the entity is unknown.
    pub fn mark_as_read(&mut self, entity: &EntityId) -> Result<(), EntityError> {
        let record = self
            .entities
            .get(entity)
            .ok_or_else(|| EntityError::unknown(entity))?;
        let last_timestamp = record.last_timestamp();
        self.update_state(entity, |state| on_mark_as_read(state, last_timestamp));
        Ok(())
    }

    /// Records a window visibility change.
    pub fn window_visibility_changed(&mut self, visible: bool) {
        if self.window_visible == visible {
            return;
        }
        self.window_visible = visible;
        debug!(visible, "Window visibility changed");

        if visible && let Some(active) = self.active.clone() {
            let last_timestamp = self.entities.get(&active).and_then(EntityRecord::last_timestamp);
            self.update_state(&active, |state| {
                on_window_became_visible(state, true, last_timestamp)
            });
        }
        self.bump();
    }

    /// Records that a message became visible in the viewport.
    ///
    /// # Errors
    /// Returns error if the entity is unknown or the new read position
    /// could not be persisted.
    pub async fn message_seen(
        &mut self,
        entity: &EntityId,
        message_id: &MessageId,
    ) -> Result<(), EntityError> {
        let advanced = self.transition(entity, |state, timeline| {
            on_message_seen(state, message_id, timeline)
        })?;
        if let Some(position) = advanced {
            self.positions.save_last_seen(entity, &position).await?;
        }
        Ok(())
    }

    /// Removes the new messages marker.
    ///
    /// # Errors
    /// Returns error if the entity is unknown.
    pub fn clear_marker(&mut self, entity: &EntityId) -> Result<(), EntityError> {
        if !self.entities.contains_key(entity) {
            return Err(EntityError::unknown(entity));
        }
        self.update_state(entity, on_clear_marker);
        Ok(())
    }

    /// Drops the timeline and cached messages of an entity. Read state is
    /// kept.
    ///
    /// # Errors
    /// Returns error if the entity is unknown or the cache could not be
    /// cleared.
    pub async fn clear_history(&mut self, entity: &EntityId) -> Result<(), EntityError> {
        let record = self
            .entities
            .get_mut(entity)
            .ok_or_else(|| EntityError::unknown(entity))?;
        record.timeline.clear();
        self.bump_entity(entity);
        self.cache.clear(entity).await?;
        Ok(())
    }

    /// Sets the persisted notify-all preference of a room.
    ///
    /// # Errors
    /// Returns error if the entity is unknown.
    pub fn set_notify_all(&mut self, entity: &EntityId, value: bool) -> Result<(), EntityError> {
        let record = self
            .entities
            .get_mut(entity)
            .ok_or_else(|| EntityError::unknown(entity))?;
        record.notify_all.persisted = Some(value);
        Ok(())
    }

    /// Sets or clears the session notify-all override of a room.
    ///
    /// # Errors
    /// Returns error if the entity is unknown.
    pub fn set_notify_all_override(
        &mut self,
        entity: &EntityId,
        value: Option<bool>,
    ) -> Result<(), EntityError> {
        let record = self
            .entities
            .get_mut(entity)
            .ok_or_else(|| EntityError::unknown(entity))?;
        record.notify_all = record.notify_all.with_session_override(value);
        Ok(())
    }

    /// Sets the number of pending events counted into the badge.
    pub fn set_pending_events(&mut self, count: u32) {
        if self.pending_events != count {
            self.pending_events = count;
            self.bump();
        }
    }

    /// Application badge value.
    #[must_use]
    pub fn badge_count(&self) -> u32 {
        let mut sources = BadgeSources {
            pending_events: self.pending_events,
            ..BadgeSources::default()
        };
        for record in self.entities.values() {
            let unread = record.state.unread_count;
            match record.kind {
                EntityKind::Conversation => {
                    sources.conversations = sources.conversations.saturating_add(unread);
                }
                EntityKind::Room => sources.rooms = sources.rooms.saturating_add(unread),
            }
        }
        compute_badge_count(sources)
    }

    /// Entity ids ordered by most recent message, newest first. Entities
    /// without messages come last, ordered by id.
    pub fn entities_by_activity<'a>(
        &self,
        memo: &'a mut VersionedMemo<Vec<EntityId>>,
    ) -> &'a [EntityId] {
        memo.get_or_compute(self.version, || {
            let mut ids: Vec<_> = self
                .entities
                .iter()
                .map(|(id, record)| (record.last_timestamp(), id.clone()))
                .collect();
            ids.sort_by(|(a_ts, a_id), (b_ts, b_id)| b_ts.cmp(a_ts).then_with(|| a_id.cmp(b_id)));
            ids.into_iter().map(|(_, id)| id).collect()
        })
    }

    fn context_for(&self, entity: &EntityId) -> EntityContext {
        EntityContext::new(self.active.as_ref() == Some(entity), self.window_visible)
    }

    /// Applies a transition that needs the timeline. Returns the new last
    /// seen id when it changed.
    fn transition<F>(
        &mut self,
        entity: &EntityId,
        apply: F,
    ) -> Result<Option<MessageId>, EntityError>
    where
        F: FnOnce(&SharedState, &[NotificationMessage]) -> SharedState,
    {
        let record = self
            .entities
            .get_mut(entity)
            .ok_or_else(|| EntityError::unknown(entity))?;
        let next = apply(&record.state, &record.timeline);
        if Arc::ptr_eq(&next, &record.state) {
            return Ok(None);
        }
        let advanced = (next.last_seen_message_id != record.state.last_seen_message_id)
            .then(|| next.last_seen_message_id.clone())
            .flatten();
        record.state = next;
        self.bump_entity(entity);
        Ok(advanced)
    }

    fn update_state(&mut self, entity: &EntityId, apply: impl FnOnce(&SharedState) -> SharedState) {
        let Some(record) = self.entities.get_mut(entity) else {
            return;
        };
        let next = apply(&record.state);
        if !Arc::ptr_eq(&next, &record.state) {
            record.state = next;
            self.bump_entity(entity);
        }
    }

    fn bump_entity(&mut self, entity: &EntityId) {
        self.bump();
        if let Some(record) = self.entities.get_mut(entity) {
            record.version = self.version;
        }
    }

    fn bump(&mut self) {
        self.version += 1;
        let snapshot = StoreSnapshot {
            version: self.version,
            badge_count: self.badge_count(),
            active: self.active.clone(),
        };
        self.snapshot_tx.send_replace(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use chrono::{TimeDelta, Utc};

    use super::*;
    use crate::domain::ports::mocks::{MockMessageCache, MockReadPositionStore};

    fn store_with(
        cache: Arc<MockMessageCache>,
        positions: Arc<MockReadPositionStore>,
    ) -> EntityStore {
        EntityStore::new(cache, positions, StoreSettings::default())
    }

    fn make_store() -> (EntityStore, Arc<MockMessageCache>, Arc<MockReadPositionStore>) {
        let cache = Arc::new(MockMessageCache::new());
        let positions = Arc::new(MockReadPositionStore::new());
        (
            store_with(Arc::clone(&cache), Arc::clone(&positions)),
            cache,
            positions,
        )
    }

    fn msg(id: &str, seconds_ago: i64) -> NotificationMessage {
        NotificationMessage::new(id, "bob", Utc::now() - TimeDelta::seconds(seconds_ago))
    }

    #[tokio::test]
    async fn test_track_restores_position() {
        let cache = Arc::new(MockMessageCache::new());
        let positions = Arc::new(MockReadPositionStore::with_position("alice", "m7"));
        let mut store = store_with(cache, positions);
        let alice = EntityId::from("alice");

        store
            .track(alice.clone(), EntityKind::Conversation)
            .await
            .unwrap();

        let state = store.state(&alice).unwrap();
        assert_eq!(state.last_seen_message_id, Some(MessageId::from("m7")));
    }

    #[tokio::test]
    async fn test_track_twice_fails() {
        let (mut store, _, _) = make_store();
        let alice = EntityId::from("alice");
        store
            .track(alice.clone(), EntityKind::Conversation)
            .await
            .unwrap();

        let result = store.track(alice, EntityKind::Room).await;

        assert!(matches!(result, Err(EntityError::AlreadyTracked { .. })));
    }

    #[tokio::test]
    async fn test_unknown_entity_is_rejected() {
        let (mut store, _, _) = make_store();

        let result = store
            .apply_live(&EntityId::from("ghost"), msg("m1", 0))
            .await;

        assert!(matches!(result, Err(EntityError::UnknownEntity { .. })));
    }

    #[tokio::test]
    async fn test_live_message_in_background_counts_and_notifies() {
        let (mut store, cache, _) = make_store();
        let alice = EntityId::from("alice");
        store
            .track(alice.clone(), EntityKind::Conversation)
            .await
            .unwrap();

        let report = store.apply_live(&alice, msg("m1", 0)).await.unwrap();

        assert_eq!(report.accepted, 1);
        assert!(report.state_changed);
        assert_eq!(report.notification, Some(NotifyDecision::Conversation));
        assert_eq!(store.state(&alice).unwrap().unread_count, 1);
        assert_eq!(store.badge_count(), 1);
        assert_eq!(cache.store_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_duplicate_live_message_is_ignored() {
        let (mut store, cache, _) = make_store();
        let alice = EntityId::from("alice");
        store
            .track(alice.clone(), EntityKind::Conversation)
            .await
            .unwrap();
        store.apply_live(&alice, msg("m1", 0)).await.unwrap();
        let version = store.version();

        let report = store.apply_live(&alice, msg("m1", 0)).await.unwrap();

        assert_eq!(report, IngestReport::duplicates_only());
        assert_eq!(store.version(), version);
        assert_eq!(store.state(&alice).unwrap().unread_count, 1);
        assert_eq!(cache.store_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_active_visible_entity_stays_read() {
        let (mut store, _, _) = make_store();
        let alice = EntityId::from("alice");
        store
            .track(alice.clone(), EntityKind::Conversation)
            .await
            .unwrap();
        store.activate(&alice).await.unwrap();

        let report = store.apply_live(&alice, msg("m1", 0)).await.unwrap();

        assert_eq!(report.notification, None);
        assert_eq!(store.state(&alice).unwrap().unread_count, 0);
        assert_eq!(store.badge_count(), 0);
    }

    #[tokio::test]
    async fn test_room_mention_counts_and_notifies() {
        let (mut store, _, _) = make_store();
        let room = EntityId::from("room@conference");
        store.track(room.clone(), EntityKind::Room).await.unwrap();

        let plain = store.apply_live(&room, msg("m1", 0)).await.unwrap();
        let mention = store
            .apply_live(&room, msg("m2", 0).mentioning())
            .await
            .unwrap();

        assert_eq!(plain.notification, None);
        assert_eq!(
            mention.notification,
            Some(NotifyDecision::Room { is_mention: true })
        );
        let state = store.state(&room).unwrap();
        assert_eq!(state.unread_count, 2);
        assert_eq!(state.mentions_count, 1);
    }

    #[tokio::test]
    async fn test_room_notify_all_override() {
        let (mut store, _, _) = make_store();
        let room = EntityId::from("room@conference");
        store.track(room.clone(), EntityKind::Room).await.unwrap();
        store.set_notify_all(&room, false).unwrap();
        store.set_notify_all_override(&room, Some(true)).unwrap();

        let report = store.apply_live(&room, msg("m1", 0)).await.unwrap();

        assert_eq!(
            report.notification,
            Some(NotifyDecision::Room { is_mention: false })
        );
    }

    #[tokio::test]
    async fn test_delayed_live_conversation_message_counts() {
        let (mut store, _, _) = make_store();
        let alice = EntityId::from("alice");
        store
            .track(alice.clone(), EntityKind::Conversation)
            .await
            .unwrap();

        store
            .apply_live(&alice, msg("m1", 30).delayed())
            .await
            .unwrap();

        assert_eq!(store.state(&alice).unwrap().unread_count, 1);
    }

    #[tokio::test]
    async fn test_cache_batch_is_not_written_back() {
        let (mut store, cache, _) = make_store();
        let alice = EntityId::from("alice");
        store
            .track(alice.clone(), EntityKind::Conversation)
            .await
            .unwrap();

        let report = store
            .apply_cache_batch(
                &alice,
                PaginationDirection::Backward,
                vec![msg("m1", 60).delayed(), msg("m2", 30).delayed()],
            )
            .await
            .unwrap();

        assert_eq!(report.accepted, 2);
        assert!(!report.state_changed);
        assert_eq!(cache.store_calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.timeline(&alice).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cached_live_messages_do_not_count_again() {
        let (mut store, _, _) = make_store();
        let alice = EntityId::from("alice");
        store
            .track(alice.clone(), EntityKind::Conversation)
            .await
            .unwrap();

        store
            .apply_cache_batch(&alice, PaginationDirection::Forward, vec![msg("m1", 60)])
            .await
            .unwrap();

        assert_eq!(store.state(&alice).unwrap().unread_count, 0);
        assert_eq!(store.timeline(&alice).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_backward_page_prepends() {
        let (mut store, _, _) = make_store();
        let alice = EntityId::from("alice");
        store
            .track(alice.clone(), EntityKind::Conversation)
            .await
            .unwrap();
        store.apply_live(&alice, msg("m3", 0)).await.unwrap();

        store
            .apply_page(
                &alice,
                PaginationDirection::Backward,
                vec![msg("m2", 60).delayed(), msg("m1", 120).delayed()],
            )
            .await
            .unwrap();

        let ids: Vec<_> = store
            .timeline(&alice)
            .unwrap()
            .iter()
            .map(|m| m.id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn test_older_history_page_keeps_live_counts() {
        let (mut store, _, _) = make_store();
        let alice = EntityId::from("alice");
        store
            .track(alice.clone(), EntityKind::Conversation)
            .await
            .unwrap();
        for id in ["m1", "m2", "m3"] {
            store.apply_live(&alice, msg(id, 0)).await.unwrap();
        }
        let before = store.state(&alice).unwrap();

        let report = store
            .apply_page(
                &alice,
                PaginationDirection::Backward,
                vec![msg("old-out", 86_400).outgoing().delayed()],
            )
            .await
            .unwrap();

        let after = store.state(&alice).unwrap();
        assert_eq!(report.accepted, 1);
        assert!(!report.state_changed);
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.unread_count, 3);
        assert_eq!(after.last_read_at, before.last_read_at);
        assert_eq!(store.badge_count(), 3);
        assert_eq!(store.timeline(&alice).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_load_cached_history_merges() {
        let (mut store, cache, _) = make_store();
        let alice = EntityId::from("alice");
        cache
            .seed("alice", vec![msg("m1", 120).delayed(), msg("m2", 60).delayed()])
            .await;
        store
            .track(alice.clone(), EntityKind::Conversation)
            .await
            .unwrap();

        let report = store
            .load_cached_history(&alice, HistoryQuery::latest(50))
            .await
            .unwrap();

        assert_eq!(report.accepted, 2);
        assert_eq!(store.timeline(&alice).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_load_cached_history_surfaces_cache_failure() {
        let (mut store, cache, _) = make_store();
        let alice = EntityId::from("alice");
        store
            .track(alice.clone(), EntityKind::Conversation)
            .await
            .unwrap();
        cache.set_failing(true);

        let result = store
            .load_cached_history(&alice, HistoryQuery::latest(50))
            .await;

        assert!(result.unwrap_err().is_persistence_error());
    }

    #[tokio::test]
    async fn test_cache_failure_does_not_fail_ingest() {
        let (mut store, cache, _) = make_store();
        let alice = EntityId::from("alice");
        store
            .track(alice.clone(), EntityKind::Conversation)
            .await
            .unwrap();
        cache.set_failing(true);

        let report = store.apply_live(&alice, msg("m1", 0)).await.unwrap();

        assert_eq!(report.accepted, 1);
    }

    #[tokio::test]
    async fn test_activate_clears_counters_and_places_marker() {
        let (mut store, _, _) = make_store();
        let alice = EntityId::from("alice");
        store
            .track(alice.clone(), EntityKind::Conversation)
            .await
            .unwrap();
        store.apply_live(&alice, msg("m1", 20)).await.unwrap();
        store.apply_live(&alice, msg("m2", 10)).await.unwrap();

        store.activate(&alice).await.unwrap();

        let state = store.state(&alice).unwrap();
        assert_eq!(state.unread_count, 0);
        assert_eq!(state.first_new_message_id, Some(MessageId::from("m1")));
        assert_eq!(store.active(), Some(&alice));
        assert_eq!(store.badge_count(), 0);
    }

    #[tokio::test]
    async fn test_switching_entity_clears_previous_marker() {
        let (mut store, _, _) = make_store();
        let alice = EntityId::from("alice");
        let carol = EntityId::from("carol");
        for id in [&alice, &carol] {
            store
                .track(id.clone(), EntityKind::Conversation)
                .await
                .unwrap();
        }
        store.apply_live(&alice, msg("m1", 10)).await.unwrap();
        store.activate(&alice).await.unwrap();
        assert!(store.state(&alice).unwrap().first_new_message_id.is_some());

        store.activate(&carol).await.unwrap();

        assert!(store.state(&alice).unwrap().first_new_message_id.is_none());
        assert_eq!(store.active(), Some(&carol));
    }

    #[tokio::test]
    async fn test_message_seen_persists_position() {
        let (mut store, _, positions) = make_store();
        let alice = EntityId::from("alice");
        store
            .track(alice.clone(), EntityKind::Conversation)
            .await
            .unwrap();
        store.apply_live(&alice, msg("m1", 20)).await.unwrap();
        store.apply_live(&alice, msg("m2", 10)).await.unwrap();

        store
            .message_seen(&alice, &MessageId::from("m2"))
            .await
            .unwrap();

        assert_eq!(positions.stored("alice").await, Some(MessageId::from("m2")));
        assert_eq!(
            store.state(&alice).unwrap().last_seen_message_id,
            Some(MessageId::from("m2"))
        );
    }

    #[tokio::test]
    async fn test_message_seen_never_moves_backwards() {
        let (mut store, _, positions) = make_store();
        let alice = EntityId::from("alice");
        store
            .track(alice.clone(), EntityKind::Conversation)
            .await
            .unwrap();
        store.apply_live(&alice, msg("m1", 20)).await.unwrap();
        store.apply_live(&alice, msg("m2", 10)).await.unwrap();
        store
            .message_seen(&alice, &MessageId::from("m2"))
            .await
            .unwrap();

        store
            .message_seen(&alice, &MessageId::from("m1"))
            .await
            .unwrap();

        assert_eq!(positions.stored("alice").await, Some(MessageId::from("m2")));
    }

    #[tokio::test]
    async fn test_window_visible_clears_active_unread() {
        let (mut store, _, _) = make_store();
        let alice = EntityId::from("alice");
        store
            .track(alice.clone(), EntityKind::Conversation)
            .await
            .unwrap();
        store.activate(&alice).await.unwrap();
        store.window_visibility_changed(false);
        store.apply_live(&alice, msg("m1", 0)).await.unwrap();
        assert_eq!(store.state(&alice).unwrap().unread_count, 1);
        assert_eq!(
            store.state(&alice).unwrap().first_new_message_id,
            Some(MessageId::from("m1"))
        );

        store.window_visibility_changed(true);

        let state = store.state(&alice).unwrap();
        assert_eq!(state.unread_count, 0);
        assert_eq!(state.first_new_message_id, Some(MessageId::from("m1")));
    }

    #[tokio::test]
    async fn test_mark_as_read_and_clear_marker() {
        let (mut store, _, _) = make_store();
        let alice = EntityId::from("alice");
        store
            .track(alice.clone(), EntityKind::Conversation)
            .await
            .unwrap();
        store.apply_live(&alice, msg("m1", 0)).await.unwrap();

        store.mark_as_read(&alice).unwrap();
        let before = store.state(&alice).unwrap();
        store.clear_marker(&alice).unwrap();

        assert_eq!(before.unread_count, 0);
        assert!(Arc::ptr_eq(&before, &store.state(&alice).unwrap()));
    }

    #[tokio::test]
    async fn test_remove_forgets_persisted_data() {
        let (mut store, cache, positions) = make_store();
        let alice = EntityId::from("alice");
        store
            .track(alice.clone(), EntityKind::Conversation)
            .await
            .unwrap();
        store.apply_live(&alice, msg("m1", 0)).await.unwrap();
        store
            .message_seen(&alice, &MessageId::from("m1"))
            .await
            .unwrap();

        store.remove(&alice).await.unwrap();

        assert!(store.state(&alice).is_none());
        assert_eq!(positions.stored("alice").await, None);
        assert!(cache.stored.read().await.get(&alice).is_none());
    }

    #[tokio::test]
    async fn test_clear_history_keeps_read_state() {
        let (mut store, _, _) = make_store();
        let alice = EntityId::from("alice");
        store
            .track(alice.clone(), EntityKind::Conversation)
            .await
            .unwrap();
        store.apply_live(&alice, msg("m1", 0)).await.unwrap();

        store.clear_history(&alice).await.unwrap();

        assert!(store.timeline(&alice).unwrap().is_empty());
        assert_eq!(store.state(&alice).unwrap().unread_count, 1);
    }

    #[tokio::test]
    async fn test_snapshot_published_on_change() {
        let (mut store, _, _) = make_store();
        let mut rx = store.subscribe();
        let alice = EntityId::from("alice");
        store
            .track(alice.clone(), EntityKind::Conversation)
            .await
            .unwrap();
        store.apply_live(&alice, msg("m1", 0)).await.unwrap();
        store.set_pending_events(2);

        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.badge_count, 3);
        assert_eq!(snapshot.version, store.version());
    }

    #[tokio::test]
    async fn test_entities_by_activity_is_memoised() {
        let (mut store, _, _) = make_store();
        let mut memo = VersionedMemo::new();
        for (id, age) in [("old", 100), ("new", 5)] {
            let entity = EntityId::from(id);
            store
                .track(entity.clone(), EntityKind::Conversation)
                .await
                .unwrap();
            store.apply_live(&entity, msg(id, age)).await.unwrap();
        }
        store
            .track(EntityId::from("empty"), EntityKind::Room)
            .await
            .unwrap();

        let order = store.entities_by_activity(&mut memo).to_vec();
        assert_eq!(
            order,
            vec![
                EntityId::from("new"),
                EntityId::from("old"),
                EntityId::from("empty")
            ]
        );
        assert_eq!(memo.cached_version(), Some(store.version()));
    }
}
