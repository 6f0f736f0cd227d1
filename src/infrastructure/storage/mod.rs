//! Read position storage adapters.

mod read_position_store;

pub use read_position_store::TomlReadPositionStore;
