//! idbkit Schema Registry
//!
//! Per-database configuration built during application setup:
//! - Databases are declared by name, the first (or an explicit) one is the default
//! - Upgrade callbacks are registered against positive integer versions
//! - Callbacks for one version run in registration order

mod config;
mod error;
mod registry;
mod version;

pub use config::{DatabaseConfig, UpgradeCallback, UpgradeStep};
pub use error::SchemaError;
pub use registry::SchemaRegistry;
pub use version::{IntoSchemaVersion, SchemaVersion};

pub type Result<T> = std::result::Result<T, SchemaError>;
