//! idbkit Connection Manager
//!
//! - One shared connection handle per database name
//! - Opens at the registry's highest declared version
//! - On upgrade, runs pending callbacks in ascending version order
//! - Failed handles stay cached until explicitly reset

mod error;
mod handle;
mod manager;
mod migration;

pub use error::{normalize_error, ConnectionError};
pub use handle::{Connection, ConnectionHandle, HandleStatus};
pub use manager::ConnectionManager;
pub use migration::{run_migrations, MigrationError, MigrationReport};

pub type Result<T> = std::result::Result<T, ConnectionError>;
