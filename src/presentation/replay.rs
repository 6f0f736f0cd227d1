//! Script replay.
//!
//! Drives an [`EntityStore`] with scripted events and renders one summary
//! line per touched entity. The active entity's timeline is laid out in a
//! [`LayoutViewport`] watched by a [`ViewportReadTracker`], so `scroll` and
//! `wait` events exercise the same seen reporting a real client uses.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::Result;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::application::dto::{IngestReport, NotifyDecision, ScriptEvent};
use crate::application::services::{SeenCallback, TrackerConfig, ViewportReadTracker};
use crate::application::use_cases::{EntityRecord, EntityStore};
use crate::domain::entities::{EntityId, MessageId};
use crate::domain::errors::EntityError;
use crate::domain::ports::{SubtreeObserverPort, ViewportContainer, VisibilityObserverPort};
use crate::infrastructure::viewport::LayoutViewport;

const VIEWPORT_WIDTH: f64 = 80.0;
const ROW_HEIGHT: f64 = 1.0;

/// Counters collected over a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Events applied.
    pub events: usize,
    /// Events rejected by the store.
    pub failures: usize,
    /// Notifications produced.
    pub notifications: usize,
    /// Seen reports delivered by the viewport tracker.
    pub seen_reports: usize,
}

/// Replays scripted events.
pub struct ReplayRunner<W: Write> {
    store: EntityStore,
    viewport: Arc<LayoutViewport>,
    tracker: ViewportReadTracker,
    displayed: Vec<MessageId>,
    seen_tx: mpsc::UnboundedSender<(EntityId, MessageId)>,
    seen_rx: mpsc::UnboundedReceiver<(EntityId, MessageId)>,
    stats: ReplayStats,
    out: W,
}

impl<W: Write> ReplayRunner<W> {
    /// Creates a runner writing summaries to `out`.
    #[must_use]
    pub fn new(store: EntityStore, tracker_config: TrackerConfig, rows: u16, out: W) -> Self {
        let viewport = Arc::new(LayoutViewport::new(f64::from(rows), VIEWPORT_WIDTH));
        let tracker = ViewportReadTracker::new(
            Arc::clone(&viewport) as Arc<dyn VisibilityObserverPort>,
            Arc::clone(&viewport) as Arc<dyn SubtreeObserverPort>,
            tracker_config,
        );
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        Self {
            store,
            viewport,
            tracker,
            displayed: Vec::new(),
            seen_tx,
            seen_rx,
            stats: ReplayStats::default(),
            out,
        }
    }

    /// The driven store.
    #[must_use]
    pub const fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> ReplayStats {
        self.stats
    }

    /// Applies every event, then prints the badge line.
    ///
    /// # Errors
    /// Returns error if writing to the output fails.
    pub async fn run(&mut self, events: Vec<ScriptEvent>) -> Result<ReplayStats> {
        for event in events {
            self.step(event).await?;
        }
        self.drain_seen().await?;
        writeln!(self.out, "badge={}", self.store.badge_count())?;
        Ok(self.stats)
    }

    /// Applies one event and prints its summary.
    ///
    /// # Errors
    /// Returns error if writing to the output fails.
    pub async fn step(&mut self, event: ScriptEvent) -> Result<()> {
        self.stats.events += 1;
        let name = event.name();
        let subject = event.entity().cloned();
        debug!(event = name, "Replaying event");

        match self.apply(event).await {
            Ok(Some(report)) => {
                if let (Some(decision), Some(entity)) = (report.notification, &subject) {
                    self.stats.notifications += 1;
                    writeln!(self.out, "notify {entity} {}", describe(decision))?;
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(event = name, error = %e, "Event rejected");
                self.stats.failures += 1;
                writeln!(self.out, "{name}: error: {e}")?;
                return Ok(());
            }
        }

        self.drain_seen().await?;
        match subject {
            Some(entity) => self.print_entity(name, &entity)?,
            None => self.print_all(name)?,
        }
        Ok(())
    }

    async fn apply(&mut self, event: ScriptEvent) -> Result<Option<IngestReport>, EntityError> {
        match event {
            ScriptEvent::Track { entity, kind } => {
                self.store.track(entity, kind).await?;
            }
            ScriptEvent::Live { entity, message } => {
                let report = self.store.apply_live(&entity, message).await?;
                self.sync_viewport(&entity);
                return Ok(Some(report));
            }
            ScriptEvent::Page {
                entity,
                direction,
                messages,
            } => {
                let report = self.store.apply_page(&entity, direction, messages).await?;
                self.sync_viewport(&entity);
                return Ok(Some(report));
            }
            ScriptEvent::Cache {
                entity,
                direction,
                messages,
            } => {
                let report = self
                    .store
                    .apply_cache_batch(&entity, direction, messages)
                    .await?;
                self.sync_viewport(&entity);
                return Ok(Some(report));
            }
            ScriptEvent::Activate { entity } => {
                self.store.activate(&entity).await?;
                self.rebuild_viewport(&entity);
            }
            ScriptEvent::Deactivate => {
                self.store.deactivate();
                self.close_viewport();
            }
            ScriptEvent::MarkRead { entity } => self.store.mark_as_read(&entity)?,
            ScriptEvent::Visibility { visible } => self.store.window_visibility_changed(visible),
            ScriptEvent::Seen { entity, message_id } => {
                self.store.message_seen(&entity, &message_id).await?;
            }
            ScriptEvent::ClearMarker { entity } => self.store.clear_marker(&entity)?,
            ScriptEvent::Remove { entity } => {
                if self.tracker.entity().as_ref() == Some(&entity) {
                    self.close_viewport();
                }
                self.store.remove(&entity).await?;
            }
            ScriptEvent::NotifyAll { entity, value } => {
                self.store.set_notify_all(&entity, value)?;
            }
            ScriptEvent::PendingEvents { count } => self.store.set_pending_events(count),
            ScriptEvent::Scroll { offset } => {
                self.viewport.scroll_to(f64::from(offset) * ROW_HEIGHT);
                self.pump_viewport();
            }
            ScriptEvent::Wait { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
        }
        Ok(None)
    }

    /// Lays out the whole timeline of `entity` and restarts tracking,
    /// scrolled to the newest message.
    fn rebuild_viewport(&mut self, entity: &EntityId) {
        self.tracker.deactivate();
        self.viewport.clear();
        self.displayed.clear();
        if let Some(timeline) = self.store.timeline(entity) {
            for message in timeline {
                self.viewport.push_message(message.id.clone(), ROW_HEIGHT);
                self.displayed.push(message.id.clone());
            }
        }
        self.viewport.scroll_to_bottom();

        let sink = self.seen_tx.clone();
        let callback: SeenCallback = Arc::new(move |entity: &EntityId, id: &MessageId| {
            let _ = sink.send((entity.clone(), id.clone()));
        });
        self.tracker.activate(
            Some(Arc::clone(&self.viewport) as Arc<dyn ViewportContainer>),
            entity.clone(),
            true,
            Some(callback),
        );
        self.pump_viewport();
    }

    /// Mirrors a timeline change of the tracked entity. Appended messages
    /// become new rows; anything else is laid out again.
    fn sync_viewport(&mut self, entity: &EntityId) {
        if self.tracker.entity().as_ref() != Some(entity) {
            return;
        }
        let Some(timeline) = self.store.timeline(entity) else {
            return;
        };

        let appended = timeline.len() >= self.displayed.len()
            && timeline
                .iter()
                .zip(&self.displayed)
                .all(|(message, id)| message.id == *id);
        if !appended {
            self.rebuild_viewport(entity);
            return;
        }

        let at_bottom = self.viewport.scroll_offset() >= self.viewport.max_scroll();
        let fresh: Vec<_> = timeline[self.displayed.len()..]
            .iter()
            .map(|message| message.id.clone())
            .collect();
        for id in fresh {
            self.viewport.push_message(id.clone(), ROW_HEIGHT);
            self.displayed.push(id);
        }
        if at_bottom {
            self.viewport.scroll_to_bottom();
        }
        self.pump_viewport();
    }

    fn close_viewport(&mut self) {
        self.tracker.deactivate();
        self.viewport.clear();
        self.displayed.clear();
    }

    fn pump_viewport(&self) {
        self.tracker.handle_mutations(&self.viewport.take_added());
        self.tracker
            .handle_intersections(&self.viewport.take_intersections());
    }

    async fn drain_seen(&mut self) -> Result<()> {
        while let Ok((entity, message_id)) = self.seen_rx.try_recv() {
            self.stats.seen_reports += 1;
            writeln!(self.out, "seen {entity} {message_id}")?;
            if let Err(e) = self.store.message_seen(&entity, &message_id).await {
                warn!(entity = %entity, error = %e, "Failed to apply seen report");
            }
        }
        Ok(())
    }

    fn print_entity(&mut self, event: &str, entity: &EntityId) -> Result<()> {
        let line = self.store.record(entity).map_or_else(
            || format!("{event} {entity}: removed"),
            |record| {
                let active = self.store.active() == Some(entity);
                format!("{event} {}", format_summary(entity, record, active))
            },
        );
        writeln!(self.out, "{line}")?;
        Ok(())
    }

    fn print_all(&mut self, event: &str) -> Result<()> {
        let mut entities: Vec<_> = self.store.entity_ids().cloned().collect();
        entities.sort();
        if entities.is_empty() {
            writeln!(self.out, "{event}")?;
        }
        for entity in &entities {
            self.print_entity(event, entity)?;
        }
        Ok(())
    }
}

const fn describe(decision: NotifyDecision) -> &'static str {
    match decision {
        NotifyDecision::Conversation => "message",
        NotifyDecision::Room { is_mention: true } => "mention",
        NotifyDecision::Room { is_mention: false } => "room message",
    }
}

fn or_dash(id: Option<&MessageId>) -> &str {
    id.map_or("-", MessageId::as_str)
}

/// One-line summary of an entity.
#[must_use]
pub fn format_summary(entity: &EntityId, record: &EntityRecord, active: bool) -> String {
    let state = &record.state;
    format!(
        "{entity} [{}{}] unread={} mentions={} marker={} last_seen={} messages={}",
        record.kind,
        if active { ", active" } else { "" },
        state.unread_count,
        state.mentions_count,
        or_dash(state.first_new_message_id.as_ref()),
        or_dash(state.last_seen_message_id.as_ref()),
        record.timeline.len(),
    )
}
