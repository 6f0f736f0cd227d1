//! Data transfer objects for the application layer.

mod ingest_dto;
mod script_dto;

pub use ingest_dto::{
    IngestReport, MessageSource, NotifyDecision, PaginationDirection, StoreSnapshot,
};
pub use script_dto::{ScriptEvent, ScriptParseError, parse_script};
