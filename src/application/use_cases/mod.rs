//! Use case implementations.

mod entity_state_holder;

pub use entity_state_holder::{
    DEFAULT_MAX_RETAINED_MESSAGES, EntityRecord, EntityStore, StoreSettings,
};
