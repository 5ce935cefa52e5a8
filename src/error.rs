use std::time::Duration;

use thiserror::Error;

use crate::connection_string::ConnectionStringError;
use crate::token::TokenError;

/// Errors raised by a device messaging transport
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// A session was requested before the transport runtime was initialized
    #[error("transport runtime is not initialized")]
    NotInitialized,
    /// The connection string could not be parsed
    #[error("invalid connection string: {0}")]
    ConnectionString(#[from] ConnectionStringError),
    /// The device credential could not be turned into a token source
    #[error("invalid device credential: {0}")]
    Token(#[from] TokenError),
    ///
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    ///
    #[error("tls error: {0}")]
    Tls(#[from] native_tls::Error),
    /// The hub answered CONNECT with something other than an accepted CONNACK
    #[error("hub refused the connection: {0}")]
    ConnectionRefused(String),
    /// A packet could not be encoded, decoded or addressed
    #[error("mqtt protocol error: {0}")]
    Protocol(String),
    /// An operation did not complete in time
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The outgoing message queue has no free slot
    #[error("outgoing message queue is full")]
    QueueFull,
    /// The session has been closed or its connection dropped
    #[error("session is closed")]
    SessionClosed,
    /// Anything else a transport implementation wants to report
    #[error("{0}")]
    Other(String),
}

/// Result type returned by transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Failures the publisher reports to the user
///
/// `Usage`, `TransportInit` and `SessionOpen` end the run with a non-zero exit
/// status. `MessageConstruction` and `SendSubmission` only affect the iteration
/// they occur in.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Wrong number of arguments or an empty connection string
    #[error("Usage: {program} \"<connection-string>\"")]
    Usage {
        /// Name the program was invoked as
        program: String,
    },
    ///
    #[error("Failed to initialize IoT Hub transport")]
    TransportInit(#[source] TransportError),
    ///
    #[error("Failed to create device client handle")]
    SessionOpen(#[source] TransportError),
    ///
    #[error("Failed to create IoT Hub message")]
    MessageConstruction(#[source] serde_json::Error),
    ///
    #[error("Failed to send message")]
    SendSubmission(#[source] TransportError),
}
