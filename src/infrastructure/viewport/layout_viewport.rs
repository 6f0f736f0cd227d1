//! Polling viewport over a vertical row layout.
//!
//! Terminal and headless hosts have no intersection or mutation observers.
//! `LayoutViewport` keeps a list of stacked message rows plus a scroll
//! offset and produces the same observations on demand: call
//! [`LayoutViewport::take_added`] and [`LayoutViewport::take_intersections`]
//! after every layout change and feed the results to the tracker.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::trace;

use crate::domain::entities::{ElementKey, IntersectionEntry, MessageId, Rect, ViewportElement};
use crate::domain::ports::{SubtreeObserverPort, ViewportContainer, VisibilityObserverPort};

const CONTAINER_KEY: ElementKey = ElementKey(0);

#[derive(Debug, Clone)]
struct Row {
    key: ElementKey,
    message_id: MessageId,
    height: f64,
}

#[derive(Debug, Default)]
struct Layout {
    rows: Vec<Row>,
    scroll_offset: f64,
    next_key: u64,
    observed: HashSet<ElementKey>,
    last_ratio: HashMap<ElementKey, f64>,
    subtree_observed: bool,
    added: Vec<ViewportElement>,
}

impl Layout {
    fn content_height(&self) -> f64 {
        self.rows.iter().map(|row| row.height).sum()
    }

    fn allocate_key(&mut self) -> ElementKey {
        self.next_key += 1;
        ElementKey(self.next_key)
    }

    fn record_added(&mut self, key: ElementKey, message_id: &MessageId) {
        if self.subtree_observed {
            self.added
                .push(ViewportElement::message(key, message_id.clone()));
        }
    }

    /// Row bounds in container coordinates.
    fn row_rects(&self, width: f64) -> impl Iterator<Item = (&Row, Rect)> {
        let mut top = -self.scroll_offset;
        self.rows.iter().map(move |row| {
            let rect = Rect::new(top, top + row.height, 0.0, width);
            top += row.height;
            (row, rect)
        })
    }
}

/// Scrollable list of message rows.
pub struct LayoutViewport {
    height: f64,
    width: f64,
    layout: Mutex<Layout>,
}

impl LayoutViewport {
    /// Creates an empty viewport showing `height` rows.
    #[must_use]
    pub fn new(height: f64, width: f64) -> Self {
        Self {
            height: height.max(0.0),
            width: width.max(0.0),
            layout: Mutex::new(Layout::default()),
        }
    }

    /// Appends a message row below the existing ones.
    pub fn push_message(&self, message_id: MessageId, height: f64) -> ElementKey {
        let mut layout = self.layout.lock();
        let key = layout.allocate_key();
        layout.record_added(key, &message_id);
        layout.rows.push(Row {
            key,
            message_id,
            height: height.max(0.0),
        });
        key
    }

    /// Inserts a message row above the existing ones. The scroll offset
    /// grows by the row height so visible rows stay in place.
    pub fn prepend_message(&self, message_id: MessageId, height: f64) -> ElementKey {
        let mut layout = self.layout.lock();
        let key = layout.allocate_key();
        let height = height.max(0.0);
        layout.record_added(key, &message_id);
        layout.rows.insert(
            0,
            Row {
                key,
                message_id,
                height,
            },
        );
        layout.scroll_offset += height;
        key
    }

    /// Drops every row.
    pub fn clear(&self) {
        let mut layout = self.layout.lock();
        layout.rows.clear();
        layout.scroll_offset = 0.0;
        layout.last_ratio.clear();
    }

    /// Largest valid scroll offset.
    #[must_use]
    pub fn max_scroll(&self) -> f64 {
        (self.layout.lock().content_height() - self.height).max(0.0)
    }

    /// Scrolls so the top of the viewport is at `offset`, clamped to the
    /// content.
    pub fn scroll_to(&self, offset: f64) {
        let max = self.max_scroll();
        self.layout.lock().scroll_offset = offset.clamp(0.0, max);
    }

    /// Scrolls to the newest message.
    pub fn scroll_to_bottom(&self) {
        self.scroll_to(f64::MAX);
    }

    /// Current scroll offset.
    #[must_use]
    pub fn scroll_offset(&self) -> f64 {
        self.layout.lock().scroll_offset
    }

    /// Message rows added since the last call, while the subtree is
    /// observed.
    #[must_use]
    pub fn take_added(&self) -> Vec<ViewportElement> {
        std::mem::take(&mut self.layout.lock().added)
    }

    /// Visibility entries for observed rows whose visible share changed
    /// since the last call. Newly observed rows always produce an entry.
    #[must_use]
    pub fn take_intersections(&self) -> Vec<IntersectionEntry> {
        let viewport = self.rect();
        let mut guard = self.layout.lock();
        let layout = &mut *guard;

        let mut entries = Vec::new();
        let mut ratios = Vec::new();
        for (row, rect) in layout.row_rects(self.width) {
            if !layout.observed.contains(&row.key) {
                continue;
            }
            let ratio = if rect.area() > 0.0 {
                rect.intersection(&viewport)
                    .map_or(0.0, |overlap| overlap.area() / rect.area())
            } else {
                0.0
            };
            let changed = layout
                .last_ratio
                .get(&row.key)
                .is_none_or(|previous| (previous - ratio).abs() > f64::EPSILON);
            if changed {
                entries.push(IntersectionEntry {
                    element: row.key,
                    message_id: row.message_id.clone(),
                    intersection_ratio: ratio,
                    is_intersecting: ratio > 0.0,
                    bounding_rect: rect,
                });
            }
            ratios.push((row.key, ratio));
        }
        layout.last_ratio.extend(ratios);

        trace!(count = entries.len(), "Polled viewport intersections");
        entries
    }
}

impl ViewportContainer for LayoutViewport {
    fn key(&self) -> ElementKey {
        CONTAINER_KEY
    }

    fn rect(&self) -> Rect {
        Rect::new(0.0, self.height, 0.0, self.width)
    }

    fn element_rect(&self, element: ElementKey) -> Option<Rect> {
        let layout = self.layout.lock();
        layout
            .row_rects(self.width)
            .find(|(row, _)| row.key == element)
            .map(|(_, rect)| rect)
    }

    fn children(&self) -> Vec<ViewportElement> {
        self.layout
            .lock()
            .rows
            .iter()
            .map(|row| ViewportElement::message(row.key, row.message_id.clone()))
            .collect()
    }
}

impl VisibilityObserverPort for LayoutViewport {
    fn observe(&self, element: ElementKey) {
        self.layout.lock().observed.insert(element);
    }

    fn unobserve(&self, element: ElementKey) {
        let mut layout = self.layout.lock();
        layout.observed.remove(&element);
        layout.last_ratio.remove(&element);
    }

    fn disconnect(&self) {
        let mut layout = self.layout.lock();
        layout.observed.clear();
        layout.last_ratio.clear();
    }
}

impl SubtreeObserverPort for LayoutViewport {
    fn observe_subtree(&self, container: ElementKey) {
        if container == CONTAINER_KEY {
            self.layout.lock().subtree_observed = true;
        }
    }

    fn disconnect(&self) {
        let mut layout = self.layout.lock();
        layout.subtree_observed = false;
        layout.added.clear();
    }
}
