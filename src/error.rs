//! Error types for the chat server and client
//!
//! Defines creation/connection-level errors, handshake failure reasons,
//! and registry errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Top-level errors surfaced to callers of the server and client APIs
#[derive(Debug, Error)]
pub enum ChatError {
    /// Socket creation, bind, connect, or read/write failure (fatal to the operation)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Username rejected before any connection was attempted
    #[error("invalid username: must be 1-{} bytes", crate::protocol::MAX_USERNAME_LEN)]
    InvalidUsername,

    /// The server or client has already shut down
    #[error("connection closed")]
    Closed,
}

/// Reasons a handshake attempt is rejected
///
/// Each variant aborts only the connection attempt it occurred on; the
/// accept loop keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// No handshake line arrived within the configured window
    #[error("timed out waiting for handshake")]
    TimedOut,

    /// The peer closed the connection before sending a handshake line
    #[error("disconnected before handshake")]
    Disconnected,

    /// The line did not start with the `a-chat ` token
    #[error("malformed handshake message")]
    Malformed,

    /// The username was empty or too long
    #[error("invalid username in handshake")]
    InvalidUsername,
}

/// Errors raised by the session registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The registry already holds `capacity` sessions
    #[error("maximum number of connected clients reached")]
    CapacityExceeded,

    /// A shutdown drain has closed the registry
    #[error("no longer accepting new sessions")]
    Closed,
}
