//! Domain entity definitions.

mod entity;
mod message;
mod notify_preference;
mod read_state;
mod viewport;

pub use entity::{EntityId, EntityKind};
pub use message::{ArchiveId, MessageId, MessageView, NotificationMessage, SenderId};
pub use notify_preference::NotifyAllPreference;
pub use read_state::{EntityContext, EntityNotificationState};
pub use viewport::{ElementKey, IntersectionEntry, Rect, ViewportElement};
