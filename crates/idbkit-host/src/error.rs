//! Host engine error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Object store already exists: {0}")]
    StoreExists(String),

    #[error("Index already exists: {store}.{index}")]
    IndexExists { store: String, index: String },

    #[error("Object store not found: {0}")]
    StoreNotFound(String),

    #[error("The requested version ({requested}) is less than the existing version ({existing}).")]
    VersionTooLow { requested: u32, existing: u32 },

    #[error("Invalid version: {0}")]
    InvalidVersion(u32),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Database closed: {0}")]
    Closed(String),

    #[error("Storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl HostError {
    /// DOM exception name the error is reported under
    pub fn name(&self) -> &'static str {
        match self {
            HostError::StoreExists(_) | HostError::IndexExists { .. } => "ConstraintError",
            HostError::StoreNotFound(_) => "NotFoundError",
            HostError::VersionTooLow { .. } => "VersionError",
            HostError::InvalidVersion(_) => "TypeError",
            HostError::InvalidState(_) | HostError::Closed(_) => "InvalidStateError",
            HostError::Sqlite(_) | HostError::Io(_) | HostError::Task(_) => "UnknownError",
        }
    }
}
