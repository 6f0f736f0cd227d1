//! Domain error types.

mod entity_error;
mod persistence_error;

pub use entity_error::EntityError;
pub use persistence_error::PersistenceError;
