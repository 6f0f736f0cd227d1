//! Application layer with services, use cases and DTOs.

/// Data transfer objects.
pub mod dto;
/// Read-state and timeline services.
pub mod services;
/// Use case implementations.
pub mod use_cases;

pub use dto::{IngestReport, NotifyDecision, PaginationDirection, ScriptEvent, StoreSnapshot};
pub use use_cases::{EntityStore, StoreSettings};
