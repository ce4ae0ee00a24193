//! Errors raised while exchanging tags with the controller.

use thiserror::Error;

use crate::tag::{TagKind, TagStatus};

/// Errors that can occur during a tag exchange.
///
/// Transport problems (`Io`, `ConnectionFailed`, `Timeout`, `NotConnected`)
/// mean the link itself is in doubt. `BadStatus` and `TypeMismatch` mean the
/// link worked but the controller answered with something unusable.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Low-level I/O error (socket read/write failure).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to establish the TCP connection to the gateway.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// An operation was attempted while the socket is down.
    #[error("Not connected to {0}")]
    NotConnected(String),

    /// No response received within the timeout period.
    #[error("Timeout waiting for response")]
    Timeout,

    /// The controller answered with a status other than `Success`.
    #[error("Tag {tag}: {status}")]
    BadStatus {
        /// Tag the request was addressed to
        tag: String,
        /// Status reported by the controller
        status: TagStatus,
    },

    /// The tag holds a value that cannot be read as the requested type.
    #[error("Tag {tag}: expected {expected}, got {actual}")]
    TypeMismatch {
        tag: String,
        expected: TagKind,
        actual: TagKind,
    },

    /// Tag name cannot be carried by the gateway protocol.
    #[error("Invalid tag name: {0:?}")]
    InvalidTag(String),

    /// Response doesn't match the expected format.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LinkError {
    /// True when the error says the transport is down rather than that the
    /// controller rejected a single request.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            LinkError::Io(_)
                | LinkError::ConnectionFailed(_)
                | LinkError::NotConnected(_)
                | LinkError::Timeout
        )
    }
}

/// Result type for tag operations.
pub type LinkResult<T> = Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(LinkError::Timeout.is_transport());
        assert!(LinkError::NotConnected("10.0.0.1:44818".into()).is_transport());
        assert!(!LinkError::BadStatus {
            tag: "CommandPos".into(),
            status: TagStatus::PathSegmentError,
        }
        .is_transport());
    }

    #[test]
    fn test_bad_status_message_names_tag() {
        let err = LinkError::BadStatus {
            tag: "RequestedPosition".into(),
            status: TagStatus::ConnectionFailure,
        };
        assert_eq!(err.to_string(), "Tag RequestedPosition: Connection failure");
    }
}
