//! Tracks which message is visible at the bottom of a scrollable view and
//! reports it as seen, throttled.
//!
//! The host owns the platform observers and forwards their output to
//! [`ViewportReadTracker::handle_intersections`] and
//! [`ViewportReadTracker::handle_mutations`]. Reported ids are meant for
//! `notification_state_machine::on_message_seen`; the tracker keeps no read
//! state of its own.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::domain::entities::{
    ElementKey, EntityId, IntersectionEntry, MessageId, ViewportElement,
};
use crate::domain::ports::{SubtreeObserverPort, ViewportContainer, VisibilityObserverPort};

/// Minimum delay between two seen reports.
pub const DEFAULT_SEEN_THROTTLE: Duration = Duration::from_millis(300);

/// Share of an element that must be inside the viewport to count as seen.
pub const DEFAULT_VISIBILITY_THRESHOLD: f64 = 0.5;

/// Receives `(entity, message)` for every seen report.
///
/// Invoked while the tracker holds its dispatch lock: the callback must not
/// call back into the tracker.
pub type SeenCallback = Arc<dyn Fn(&EntityId, &MessageId) + Send + Sync>;

/// Tracker tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerConfig {
    /// Minimum delay between two reports.
    pub throttle: Duration,
    /// Visible share required, `0.0..=1.0`.
    pub visibility_threshold: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            throttle: DEFAULT_SEEN_THROTTLE,
            visibility_threshold: DEFAULT_VISIBILITY_THRESHOLD,
        }
    }
}

struct Session {
    container: Arc<dyn ViewportContainer>,
    entity: EntityId,
    callback: SeenCallback,
}

#[derive(Default)]
struct TrackerState {
    session: Option<Session>,
    /// Bumped whenever the timer is cancelled; a timer only fires for the
    /// generation that scheduled it.
    generation: u64,
    observed: HashSet<ElementKey>,
    visible: HashMap<ElementKey, MessageId>,
    last_reported: Option<MessageId>,
    last_fired_at: Option<Instant>,
    pending: Option<MessageId>,
    timer: Option<JoinHandle<()>>,
}

impl TrackerState {
    fn cancel_timer(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn reset(&mut self) {
        self.cancel_timer();
        self.observed.clear();
        self.visible.clear();
        self.last_reported = None;
        self.last_fired_at = None;
        self.pending = None;
    }
}

struct Dispatch {
    callback: SeenCallback,
    entity: EntityId,
    message_id: MessageId,
}

impl Dispatch {
    fn run(self) {
        trace!(entity = %self.entity, message_id = %self.message_id, "Reporting seen message");
        (self.callback)(&self.entity, &self.message_id);
    }
}

/// Viewport read-position tracker for one entity view.
pub struct ViewportReadTracker {
    visibility: Arc<dyn VisibilityObserverPort>,
    subtree: Arc<dyn SubtreeObserverPort>,
    config: TrackerConfig,
    state: Arc<Mutex<TrackerState>>,
    /// Held while a callback runs and while resetting, so no report can be
    /// delivered after a switch or teardown returns.
    dispatch: Arc<Mutex<()>>,
}

impl ViewportReadTracker {
    /// Creates an inactive tracker.
    #[must_use]
    pub fn new(
        visibility: Arc<dyn VisibilityObserverPort>,
        subtree: Arc<dyn SubtreeObserverPort>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            visibility,
            subtree,
            config,
            state: Arc::new(Mutex::new(TrackerState::default())),
            dispatch: Arc::new(Mutex::new(())),
        }
    }

    /// Starts observing `container` on behalf of `entity`.
    ///
    /// Nothing is observed when disabled, when the container is not mounted
    /// or when there is no callback. Returns whether observation started.
    pub fn activate(
        &self,
        container: Option<Arc<dyn ViewportContainer>>,
        entity: EntityId,
        enabled: bool,
        callback: Option<SeenCallback>,
    ) -> bool {
        self.deactivate();

        let (true, Some(container), Some(callback)) = (enabled, container, callback) else {
            debug!(entity = %entity, "Viewport tracking not started");
            return false;
        };

        let _dispatch = self.dispatch.lock();
        let mut state = self.state.lock();
        state.reset();

        let container_key = container.key();
        self.observe_elements(&mut state, &container.children());
        self.subtree.observe_subtree(container_key);

        debug!(
            entity = %entity,
            observed = state.observed.len(),
            "Viewport tracking started"
        );
        state.session = Some(Session {
            container,
            entity,
            callback,
        });
        true
    }

    /// Whether observation is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.lock().session.is_some()
    }

    /// Entity currently tracked.
    #[must_use]
    pub fn entity(&self) -> Option<EntityId> {
        self.state
            .lock()
            .session
            .as_ref()
            .map(|session| session.entity.clone())
    }

    /// Nodes were added below the container.
    pub fn handle_mutations(&self, added: &[ViewportElement]) {
        let mut state = self.state.lock();
        if state.session.is_none() {
            return;
        }
        self.observe_elements(&mut state, added);
    }

    /// Visibility observations arrived.
    ///
    /// The bottom-most message is recomputed from the whole visible set, not
    /// only from the elements in `entries`.
    pub fn handle_intersections(&self, entries: &[IntersectionEntry]) {
        let _dispatch = self.dispatch.lock();

        let dispatch = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let Some(container) = state
                .session
                .as_ref()
                .map(|session| Arc::clone(&session.container))
            else {
                return;
            };

            for entry in entries {
                if entry.is_intersecting
                    && entry.intersection_ratio >= self.config.visibility_threshold
                {
                    state.visible.insert(entry.element, entry.message_id.clone());
                } else {
                    state.visible.remove(&entry.element);
                }
            }

            self.evict_unmounted(state, container.as_ref());
            let Some(candidate) = bottom_most(container.as_ref(), &state.visible) else {
                return;
            };
            self.report(state, candidate)
        };

        if let Some(dispatch) = dispatch {
            dispatch.run();
        }
    }

    /// Switches the tracked entity, dropping all throttling state and any
    /// pending report.
    pub fn switch_entity(&self, entity: EntityId) {
        let _dispatch = self.dispatch.lock();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(session) = state.session.as_mut() else {
            return;
        };
        if session.entity == entity {
            return;
        }

        debug!(from = %session.entity, to = %entity, "Switching tracked entity");
        session.entity = entity;
        let container = Arc::clone(&session.container);

        state.reset();
        self.visibility.disconnect();
        self.observe_elements(state, &container.children());
    }

    /// Stops observing. No report is delivered after this returns.
    pub fn deactivate(&self) {
        let _dispatch = self.dispatch.lock();
        let mut state = self.state.lock();
        state.reset();
        if let Some(session) = state.session.take() {
            self.visibility.disconnect();
            self.subtree.disconnect();
            debug!(entity = %session.entity, "Viewport tracking stopped");
        }
    }

    fn observe_elements(&self, state: &mut TrackerState, elements: &[ViewportElement]) {
        let mut found = Vec::new();
        for element in elements {
            element.collect_messages(&mut found);
        }
        for (key, message_id) in found {
            if state.observed.insert(key) {
                trace!(element = key.0, message_id = %message_id, "Observing message element");
                self.visibility.observe(key);
            }
        }
    }

    /// Forgets elements the container no longer holds.
    fn evict_unmounted(&self, state: &mut TrackerState, container: &dyn ViewportContainer) {
        let unmounted: HashSet<ElementKey> = state
            .observed
            .iter()
            .chain(state.visible.keys())
            .copied()
            .filter(|key| container.element_rect(*key).is_none())
            .collect();

        for key in unmounted {
            state.visible.remove(&key);
            if state.observed.remove(&key) {
                trace!(element = key.0, "Message element unmounted");
                self.visibility.unobserve(key);
            }
        }
    }

    fn report(&self, state: &mut TrackerState, candidate: MessageId) -> Option<Dispatch> {
        let now = Instant::now();
        let throttle = self.config.throttle;
        let elapsed = state.last_fired_at.map(|at| now.duration_since(at));
        let already_reported = state.last_reported.as_ref() == Some(&candidate);

        match elapsed {
            Some(elapsed) if elapsed < throttle => {
                state.pending = (!already_reported).then_some(candidate);
                if state.pending.is_some() && state.timer.is_none() {
                    self.schedule(state, throttle - elapsed);
                }
                None
            }
            _ => {
                state.cancel_timer();
                state.pending = None;
                if already_reported {
                    return None;
                }
                let session = state.session.as_ref()?;
                let dispatch = Dispatch {
                    callback: Arc::clone(&session.callback),
                    entity: session.entity.clone(),
                    message_id: candidate.clone(),
                };
                state.last_fired_at = Some(now);
                state.last_reported = Some(candidate);
                Some(dispatch)
            }
        }
    }

    fn schedule(&self, state: &mut TrackerState, delay: Duration) {
        let Ok(runtime) = Handle::try_current() else {
            warn!("No async runtime available, dropping throttled seen report");
            state.pending = None;
            return;
        };

        let generation = state.generation;
        let shared = Arc::clone(&self.state);
        let dispatch_lock = Arc::clone(&self.dispatch);

        state.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            let _dispatch = dispatch_lock.lock();
            let dispatch = {
                let mut guard = shared.lock();
                let state = &mut *guard;
                if state.generation != generation {
                    return;
                }
                state.timer = None;
                let Some(message_id) = state.pending.take() else {
                    return;
                };
                let Some(session) = &state.session else {
                    return;
                };
                let dispatch = Dispatch {
                    callback: Arc::clone(&session.callback),
                    entity: session.entity.clone(),
                    message_id: message_id.clone(),
                };
                state.last_fired_at = Some(Instant::now());
                state.last_reported = Some(message_id);
                dispatch
            };
            dispatch.run();
        }));
    }
}

impl Drop for ViewportReadTracker {
    fn drop(&mut self) {
        self.deactivate();
    }
}

/// Visible message closest to the container's bottom edge; ties go to the
/// larger bottom coordinate. Elements without a current rect are skipped.
fn bottom_most(
    container: &dyn ViewportContainer,
    visible: &HashMap<ElementKey, MessageId>,
) -> Option<MessageId> {
    let edge = container.rect().bottom;

    visible
        .iter()
        .filter_map(|(key, message_id)| {
            container
                .element_rect(*key)
                .map(|rect| (*key, rect.bottom, message_id))
        })
        .min_by(|(key_a, bottom_a, _), (key_b, bottom_b, _)| {
            (edge - bottom_a)
                .abs()
                .total_cmp(&(edge - bottom_b).abs())
                .then_with(|| bottom_b.total_cmp(bottom_a))
                .then_with(|| key_b.cmp(key_a))
        })
        .map(|(_, _, message_id)| message_id.clone())
}
