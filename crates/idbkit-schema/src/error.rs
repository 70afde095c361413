//! Schema error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
