//! Pure read-state and timeline services.

pub mod notification_state_machine;
pub mod timeline_merger;
pub mod versioned_memo;
pub mod viewport_tracker;

pub use notification_state_machine::{
    BadgeSources, ReceiveOptions, RoomNotifyDecision, SharedState, compute_badge_count,
};
pub use timeline_merger::{MergeOutcome, MessageKey, MessageKeys, message_keys};
pub use versioned_memo::VersionedMemo;
pub use viewport_tracker::{SeenCallback, TrackerConfig, ViewportReadTracker};
