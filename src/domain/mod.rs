//! Domain layer with core entities, errors and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{
    EntityContext, EntityId, EntityKind, EntityNotificationState, MessageId, MessageView,
    NotificationMessage,
};
pub use errors::{EntityError, PersistenceError};
pub use ports::{MessageCachePort, ReadPositionStorePort};
