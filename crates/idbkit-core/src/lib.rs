//! idbkit Core
//!
//! Composition root tying the schema registry, the connection manager and
//! a host engine together. Construct one [`IndexedDb`] at startup and hand
//! it to whatever needs database connections.

mod config;
mod error;
mod indexed_db;

pub use config::{Backend, Config};
pub use error::CoreError;
pub use indexed_db::IndexedDb;

// Re-export core components
pub use idbkit_connection::{
    normalize_error, Connection, ConnectionError, ConnectionHandle, ConnectionManager,
    HandleStatus, MigrationReport,
};
pub use idbkit_host::{
    DomException, HostDatabase, HostEngine, HostError, IndexParams, KeyPath, MemoryHost,
    ObjectStoreParams, OpenOutcome, ReadyState, RequestErrorEvent, SqliteHost,
    UpgradeTransaction, VersionChangeEvent,
};
pub use idbkit_schema::{
    DatabaseConfig, IntoSchemaVersion, SchemaError, SchemaRegistry, SchemaVersion,
};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Initialize logging
pub fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt().with_env_filter(filter).with_target(true).init();
}
