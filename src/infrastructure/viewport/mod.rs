//! Viewport observation adapters.

mod layout_viewport;

pub use layout_viewport::LayoutViewport;
