mod client;
pub mod paths;
mod records;

pub use client::{
    DEFAULT_BASE_URL, OsfError, OsfSession, SessionConfig, read_json, with_query_param,
};
pub use records::{
    ActionLinks, EntryKind, EntryRecord, Page, RawAttributes, RawExtra, RawLinks, RawRecord,
    Single, StorageRecord, parse_timestamp,
};
