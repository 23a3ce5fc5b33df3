//! Client session definition
//!
//! Represents one authenticated connection as the server sees it: its
//! registry position, username, outbound message channel, and the tasks
//! servicing its socket.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::ChatError;

/// Stable identifier for a session, assigned at insertion
///
/// Unlike the registry index, a session's id never changes, so a session
/// can name itself for removal even after compactions have shifted its
/// position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One authenticated, connected client
///
/// The session owns the sending side of the connection's outbound channel;
/// the socket halves themselves are owned by the reader and writer tasks.
/// Dropping the session closes the channel, which ends the writer task and
/// shuts down the write half of the socket.
#[derive(Debug)]
pub struct ClientSession {
    /// Stable id, assigned by the registry at insertion
    pub id: SessionId,
    /// Position in the registry sequence; rewritten on compaction
    pub index: usize,
    /// Username from the handshake, immutable for the session's lifetime
    pub username: String,
    /// Server → client message channel, drained by the writer task
    outbound: mpsc::UnboundedSender<String>,
    /// Task reading lines from this session's socket
    pub(crate) reader: Option<JoinHandle<()>>,
    /// Task writing broadcast lines to this session's socket
    pub(crate) writer: Option<JoinHandle<()>>,
}

impl ClientSession {
    /// Create a session record; id and index are assigned by the registry
    pub fn new(username: String, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: SessionId(0),
            index: 0,
            username,
            outbound,
            reader: None,
            writer: None,
        }
    }

    /// Queue a line for delivery to this client
    ///
    /// Returns an error if the writer task has gone away (connection closed).
    pub fn send(&self, line: &str) -> Result<(), ChatError> {
        self.outbound
            .send(line.to_string())
            .map_err(|_| ChatError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_queues_line() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = ClientSession::new("alice".to_string(), tx);

        session.send("hello").unwrap();
        assert_eq!(rx.try_recv().unwrap(), "hello");
    }

    #[test]
    fn test_send_after_receiver_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = ClientSession::new("alice".to_string(), tx);

        drop(rx);
        assert!(session.send("hello").is_err());
    }
}
