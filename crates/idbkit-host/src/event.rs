//! Error events reported by an open request

use serde::{Deserialize, Serialize};

use crate::error::HostError;

/// Ready state of the request that raised an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyState {
    /// No operation has completed yet
    Pending,
    /// The request finished, with a result or an error
    Done,
}

/// Error object attached to a finished request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomException {
    pub name: String,
    pub message: String,
}

impl DomException {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<&HostError> for DomException {
    fn from(error: &HostError) -> Self {
        Self::new(error.name(), error.to_string())
    }
}

/// Event delivered with the error and blocked outcomes of an open request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestErrorEvent {
    pub ready_state: ReadyState,
    pub error: Option<DomException>,
}

impl RequestErrorEvent {
    /// Another connection holds the database open at an older version.
    /// The request is still waiting at this point.
    pub fn blocked() -> Self {
        Self {
            ready_state: ReadyState::Pending,
            error: None,
        }
    }

    pub fn failed(error: DomException) -> Self {
        Self {
            ready_state: ReadyState::Done,
            error: Some(error),
        }
    }
}

impl From<HostError> for RequestErrorEvent {
    fn from(error: HostError) -> Self {
        Self::failed(DomException::from(&error))
    }
}
