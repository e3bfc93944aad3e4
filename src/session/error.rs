// ABOUTME: Error types surfaced by SMSC session implementations to the dispatch core
// ABOUTME: Separates transient transport failures from protocol rejections and bad input

use crate::datatypes::CommandStatus;
use std::io;
use thiserror::Error;

/// Error returned by [`SmscSession`](crate::session::SmscSession) operations.
#[derive(Debug, Error)]
pub enum SmppError {
    /// I/O error during network operations (connection, read, write)
    #[error("Connection error: {0}")]
    Connection(#[from] io::Error),

    /// SMPP protocol error indicated by command_status field
    #[error("Protocol error: {0:?}")]
    Protocol(CommandStatus),

    /// Data validation error (invalid message length, malformed addresses, etc.)
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// No response within the response timeout
    #[error("Operation timeout")]
    Timeout,

    /// Connection dropped while a request was in flight
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// No bound endpoint is available to carry the request
    #[error("Session disconnected")]
    Disconnected,

    /// Session not in correct state for operation
    #[error("Invalid session state: {0}")]
    InvalidState(String),
}

impl SmppError {
    /// Transport-level failures the drain loop skips past, leaving the token leased.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SmppError::Connection(_)
                | SmppError::Timeout
                | SmppError::ConnectionClosed
                | SmppError::Disconnected
        )
    }
}

/// Result type alias for session operations
pub type SmppResult<T> = Result<T, SmppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_transient() {
        assert!(SmppError::Timeout.is_transient());
        assert!(SmppError::ConnectionClosed.is_transient());
        assert!(SmppError::Disconnected.is_transient());
        assert!(SmppError::from(io::Error::from(io::ErrorKind::ConnectionReset)).is_transient());
    }

    #[test]
    fn data_and_state_errors_are_not_transient() {
        assert!(!SmppError::InvalidData("bad".into()).is_transient());
        assert!(!SmppError::InvalidState("unbound".into()).is_transient());
        assert!(!SmppError::Protocol(CommandStatus::SystemError).is_transient());
    }
}
