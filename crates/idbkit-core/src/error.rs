//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Schema error: {0}")]
    Schema(#[from] idbkit_schema::SchemaError),

    #[error("Connection error: {0}")]
    Connection(#[from] idbkit_connection::ConnectionError),

    #[error("Host error: {0}")]
    Host(#[from] idbkit_host::HostError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
