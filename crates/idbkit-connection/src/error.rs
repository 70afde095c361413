//! Connection error types

use idbkit_host::{ReadyState, RequestErrorEvent};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("No connection name given and no default database declared")]
    MissingConnectionName,

    #[error("Database name cannot be empty")]
    EmptyConnectionName,

    #[error("Connection to '{name}' failed: {message}")]
    ConnectionFailed { name: String, message: String },
}

impl ConnectionError {
    pub fn failed(name: &str, message: impl Into<String>) -> Self {
        ConnectionError::ConnectionFailed {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

/// Message reported for an error or blocked event of an open request
pub fn normalize_error(event: &RequestErrorEvent) -> String {
    if event.ready_state == ReadyState::Pending {
        return "Error: Operation pending".to_string();
    }

    match &event.error {
        Some(error) if !error.message.is_empty() => error.message.clone(),
        Some(error) if !error.name.is_empty() => format!("Error: {}", error.name),
        _ => "Error: Unknown error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idbkit_host::DomException;

    #[test]
    fn test_pending_request() {
        assert_eq!(
            normalize_error(&RequestErrorEvent::blocked()),
            "Error: Operation pending"
        );

        let event = RequestErrorEvent {
            ready_state: ReadyState::Pending,
            error: Some(DomException::new("AbortError", "ignored")),
        };
        assert_eq!(normalize_error(&event), "Error: Operation pending");
    }

    #[test]
    fn test_most_specific_message() {
        let event = RequestErrorEvent::failed(DomException::new("VersionError", "too low"));
        assert_eq!(normalize_error(&event), "too low");

        let event = RequestErrorEvent::failed(DomException::new("QuotaExceededError", ""));
        assert_eq!(normalize_error(&event), "Error: QuotaExceededError");

        let event = RequestErrorEvent {
            ready_state: ReadyState::Done,
            error: None,
        };
        assert_eq!(normalize_error(&event), "Error: Unknown error");
    }

    #[test]
    fn test_failed_display() {
        let err = ConnectionError::failed("shop", "Error: Operation pending");
        assert_eq!(
            err.to_string(),
            "Connection to 'shop' failed: Error: Operation pending"
        );
    }
}
