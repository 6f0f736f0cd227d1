//! Viewport observation ports.
//!
//! A browser host backs these with intersection and mutation observers;
//! other hosts can poll a layout model instead (see
//! `infrastructure::viewport::LayoutViewport`).

#[cfg(test)]
use mockall::automock;

use crate::domain::entities::{ElementKey, Rect, ViewportElement};

/// Scrollable container holding message elements.
#[cfg_attr(test, automock)]
pub trait ViewportContainer: Send + Sync {
    /// Handle of the container element itself.
    fn key(&self) -> ElementKey;

    /// Current bounds of the visible area.
    fn rect(&self) -> Rect;

    /// Current bounds of a descendant element, if it is still mounted.
    fn element_rect(&self, element: ElementKey) -> Option<Rect>;

    /// Direct children of the container, with their subtrees.
    fn children(&self) -> Vec<ViewportElement>;
}

/// Element visibility observer.
///
/// Observations are delivered by the host to
/// `ViewportReadTracker::handle_intersections`.
#[cfg_attr(test, automock)]
pub trait VisibilityObserverPort: Send + Sync {
    /// Starts reporting visibility changes of `element`.
    fn observe(&self, element: ElementKey);

    /// Stops reporting visibility changes of `element`.
    fn unobserve(&self, element: ElementKey);

    /// Stops observing every element.
    fn disconnect(&self);
}

/// Subtree mutation observer.
///
/// Added nodes are delivered by the host to
/// `ViewportReadTracker::handle_mutations`.
#[cfg_attr(test, automock)]
pub trait SubtreeObserverPort: Send + Sync {
    /// Starts reporting nodes added anywhere below `container`.
    fn observe_subtree(&self, container: ElementKey);

    /// Stops observing.
    fn disconnect(&self);
}
