//! Readmark - read-state and message timeline engine for chat clients.
//!
//! This crate tracks unread counters, the "new messages" marker and the last
//! seen position of conversations and rooms, merges message batches from
//! live delivery, history pages and a local cache, and turns viewport
//! visibility into throttled read-position reports.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing services, use cases and DTOs.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing adapters for storage, caching and layout.
pub mod infrastructure;
/// Presentation layer containing the script replay.
pub mod presentation;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "readmark";
