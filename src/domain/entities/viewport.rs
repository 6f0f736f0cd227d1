//! Geometry and element handles used by viewport observation.

use super::MessageId;

/// Opaque handle of an element in the host's view tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementKey(pub u64);

/// Axis-aligned rectangle in the host's coordinate space (y grows downwards).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[allow(missing_docs)]
pub struct Rect {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

#[allow(missing_docs)]
impl Rect {
    #[must_use]
    pub const fn new(top: f64, bottom: f64, left: f64, right: f64) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        (self.bottom - self.top).max(0.0)
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        (self.right - self.left).max(0.0)
    }

    #[must_use]
    pub fn area(&self) -> f64 {
        self.height() * self.width()
    }

    /// Overlapping region, if any.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        let rect = Self {
            top: self.top.max(other.top),
            bottom: self.bottom.min(other.bottom),
            left: self.left.max(other.left),
            right: self.right.min(other.right),
        };
        (rect.bottom > rect.top && rect.right > rect.left).then_some(rect)
    }
}

/// Element in the view tree. Elements carrying a `message_id` are message
/// elements; others are plain wrappers whose descendants may be messages.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub struct ViewportElement {
    pub key: ElementKey,
    pub message_id: Option<MessageId>,
    pub children: Vec<ViewportElement>,
}

impl ViewportElement {
    /// A message element without children.
    #[must_use]
    pub fn message(key: ElementKey, message_id: MessageId) -> Self {
        Self {
            key,
            message_id: Some(message_id),
            children: Vec::new(),
        }
    }

    /// A non-message wrapper element.
    #[must_use]
    pub const fn wrapper(key: ElementKey, children: Vec<Self>) -> Self {
        Self {
            key,
            message_id: None,
            children,
        }
    }

    /// Collects this element and all nested descendants that are messages.
    pub fn collect_messages<'a>(&'a self, out: &mut Vec<(ElementKey, &'a MessageId)>) {
        if let Some(id) = &self.message_id {
            out.push((self.key, id));
        }
        for child in &self.children {
            child.collect_messages(out);
        }
    }
}

/// One visibility observation for one element.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub struct IntersectionEntry {
    pub element: ElementKey,
    pub message_id: MessageId,
    /// Share of the element's area inside the container viewport, `0.0..=1.0`.
    pub intersection_ratio: f64,
    pub is_intersecting: bool,
    pub bounding_rect: Rect,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection_of_overlapping_rects() {
        let a = Rect::new(0.0, 10.0, 0.0, 10.0);
        let b = Rect::new(5.0, 20.0, 0.0, 10.0);

        let overlap = a.intersection(&b).unwrap();
        assert!((overlap.area() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_touching_rects_do_not_intersect() {
        let a = Rect::new(0.0, 10.0, 0.0, 10.0);
        let b = Rect::new(10.0, 20.0, 0.0, 10.0);
        assert!(a.intersection(&b).is_none());
    }

    #[test]
    fn test_collect_nested_messages() {
        let tree = ViewportElement::wrapper(
            ElementKey(1),
            vec![
                ViewportElement::message(ElementKey(2), MessageId::new("a")),
                ViewportElement::wrapper(
                    ElementKey(3),
                    vec![ViewportElement::message(ElementKey(4), MessageId::new("b"))],
                ),
            ],
        );

        let mut found = Vec::new();
        tree.collect_messages(&mut found);

        let keys: Vec<_> = found.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![ElementKey(2), ElementKey(4)]);
    }
}
