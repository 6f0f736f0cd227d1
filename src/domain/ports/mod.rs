mod message_cache_port;
mod read_position_store_port;
mod viewport_port;

pub use message_cache_port::{HistoryQuery, MessageCachePort};
pub use read_position_store_port::ReadPositionStorePort;
pub use viewport_port::{SubtreeObserverPort, ViewportContainer, VisibilityObserverPort};

#[cfg(test)]
pub use viewport_port::{MockSubtreeObserverPort, MockViewportContainer, MockVisibilityObserverPort};

#[cfg(test)]
pub mod mocks {
    pub use super::message_cache_port::mock::MockMessageCache;
    pub use super::read_position_store_port::mock::MockReadPositionStore;
}
