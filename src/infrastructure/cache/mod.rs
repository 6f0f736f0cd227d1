//! Message cache adapters.

mod memory_cache;

pub use memory_cache::{DEFAULT_CACHED_ENTITIES, DEFAULT_MESSAGES_PER_ENTITY, MemoryMessageCache};
