//! Presentation layer: script replay and summary rendering.

/// Script replay.
pub mod replay;

pub use replay::{ReplayRunner, ReplayStats, format_summary};
