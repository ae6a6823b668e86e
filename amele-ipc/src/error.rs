//! IPC error types

use amele_config::ConfigError;
use rmpv::Value;
use std::io;
use thiserror::Error;

/// Result alias used across the IPC layer
pub type IpcResult<T> = Result<T, IpcError>;

/// IPC error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IpcError {
    /// Required external configuration is missing or invalid
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Dialing the orchestrator failed
    #[error("Failed to connect to orchestrator: {0}")]
    ConnectionError(String),

    /// File or socket IO failed
    #[error("IO error: {0}")]
    IoError(String),

    /// A value could not be encoded
    #[error("Encode error: {0}")]
    EncodeError(String),

    /// Malformed or truncated data
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Operation attempted before the session was set up
    #[error("Session not initialized")]
    NotInitialized,

    /// The initial receive was attempted twice
    #[error("Session already initialized")]
    AlreadyInitialized,

    /// Operation unsupported by the active transport
    #[error("Operation not supported: {0}")]
    Capability(String),

    /// Response did not correlate with the outstanding call
    #[error("Unexpected response ({reason}): {response}")]
    UnexpectedResponse { reason: String, response: Value },

    /// The orchestrator reported a failure for the call
    #[error("{0}")]
    RemoteError(String),

    /// No response arrived before the call deadline
    #[error("Timeout waiting for response")]
    Timeout,

    /// The orchestrator hung up while a message was expected
    #[error("Connection closed")]
    ConnectionClosed,

    /// The session already ended
    #[error("Session closed")]
    SessionClosed,
}

impl IpcError {
    /// Whether the error leaves the connection in an unusable state.
    ///
    /// Encode errors are not fatal: messages are encoded into a buffer before
    /// anything is written, so the channel stays in sync.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IpcError::ConnectionError(_)
                | IpcError::IoError(_)
                | IpcError::DecodeError(_)
                | IpcError::UnexpectedResponse { .. }
                | IpcError::Timeout
                | IpcError::ConnectionClosed
        )
    }

    /// Whether the caller may handle the error and keep using the session
    pub fn is_recoverable(&self) -> bool {
        matches!(self, IpcError::RemoteError(_))
    }

    pub(crate) fn unexpected(reason: impl Into<String>, response: Value) -> Self {
        IpcError::UnexpectedResponse {
            reason: reason.into(),
            response,
        }
    }
}

impl From<io::Error> for IpcError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => IpcError::Timeout,
            _ => IpcError::IoError(err.to_string()),
        }
    }
}

impl From<ConfigError> for IpcError {
    fn from(err: ConfigError) -> Self {
        IpcError::ConfigError(err.to_string())
    }
}

impl From<rmp_serde::encode::Error> for IpcError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        IpcError::EncodeError(err.to_string())
    }
}

impl From<rmpv::decode::Error> for IpcError {
    fn from(err: rmpv::decode::Error) -> Self {
        use rmpv::decode::Error;

        match err {
            // Nothing of the next message arrived
            Error::InvalidMarkerRead(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                IpcError::ConnectionClosed
            }
            Error::InvalidMarkerRead(e) | Error::InvalidDataRead(e) => match e.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => IpcError::Timeout,
                io::ErrorKind::UnexpectedEof => {
                    IpcError::DecodeError(format!("truncated message: {}", e))
                }
                io::ErrorKind::InvalidData => IpcError::DecodeError(e.to_string()),
                _ => IpcError::IoError(e.to_string()),
            },
            other => IpcError::DecodeError(other.to_string()),
        }
    }
}
