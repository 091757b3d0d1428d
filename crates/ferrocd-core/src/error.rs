//! Error types for ferrocd.

use thiserror::Error;

use crate::permission::{PermissionScope, PermissionType};

/// Result type alias using ferrocd's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for ferrocd operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The caller's grant does not satisfy the operation's requirement.
    ///
    /// Raised by the authorization gate before the operation body runs, so no
    /// message is ever dispatched for a rejected call.
    #[error("Not authorized: {operation} requires {required:?} at {scope:?}")]
    NotAuthorized {
        operation: String,
        scope: PermissionScope,
        required: PermissionType,
    },

    /// A referenced id does not resolve
    #[error("Not found: {0}")]
    NotFound(String),

    /// A precondition of the mutation is violated (e.g. deleting a non-empty group)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Publish or subscribe on the transport failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns `true` for errors raised by the authorization gate.
    pub fn is_not_authorized(&self) -> bool {
        matches!(self, Error::NotAuthorized { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("PipelineDefinition abc".to_string());
        assert_eq!(err.to_string(), "Not found: PipelineDefinition abc");
    }

    #[test]
    fn test_error_display_not_authorized() {
        let err = Error::NotAuthorized {
            operation: "PipelineDefinitionService.add".to_string(),
            scope: PermissionScope::PipelineGroup,
            required: PermissionType::Admin,
        };
        assert_eq!(
            err.to_string(),
            "Not authorized: PipelineDefinitionService.add requires Admin at PipelineGroup"
        );
        assert!(err.is_not_authorized());
    }

    #[test]
    fn test_error_display_conflict() {
        let err = Error::Conflict("has Users assigned to it".to_string());
        assert_eq!(err.to_string(), "Conflict: has Users assigned to it");
        assert!(!err.is_not_authorized());
    }

    #[test]
    fn test_error_display_transport() {
        let err = Error::Transport("channel closed".to_string());
        assert_eq!(err.to_string(), "Transport error: channel closed");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
