//! idbkit Host Engine
//!
//! The boundary to the storage engine that actually persists databases.
//! Only the schema-level surface lives here: opening a named database at a
//! version, the version-upgrade transaction, and the opened database.
//! Reads, writes and cursors belong to the engine and are never modelled.

mod engine;
mod error;
mod event;
mod memory;
mod sqlite;

pub use engine::{
    HostDatabase, HostEngine, IndexParams, KeyPath, ObjectStoreParams, OpenOutcome,
    UpgradeTransaction, VersionChangeEvent,
};
pub use error::HostError;
pub use event::{DomException, ReadyState, RequestErrorEvent};
pub use memory::MemoryHost;
pub use sqlite::SqliteHost;

pub type Result<T> = std::result::Result<T, HostError>;
