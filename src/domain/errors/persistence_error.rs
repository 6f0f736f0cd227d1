//! Persistence error types.

use thiserror::Error;

/// Failures reported by cache and read-position collaborators.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to load from storage: {0}")]
    LoadFailed(String),

    #[error("failed to write to storage: {0}")]
    StoreFailed(String),

    #[error("storage not available: {0}")]
    NotAvailable(String),
}
