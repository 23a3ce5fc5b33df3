//! Session registry
//!
//! A capacity-bounded, order-preserving collection of active sessions.
//! The registry itself is plain data; the server wraps it in a single
//! `std::sync::Mutex` and keeps every critical section short and free of
//! socket I/O. Outbound delivery goes through each session's channel, so
//! broadcasting under the lock never blocks.

use tracing::warn;

use crate::error::RegistryError;
use crate::session::{ClientSession, SessionId};

/// Ordered collection of connected sessions, at most `capacity` at a time
///
/// Invariants:
/// - every session's `index` equals its position in the sequence
/// - removal compacts stably: remaining sessions keep their relative order
#[derive(Debug)]
pub struct ClientRegistry {
    sessions: Vec<ClientSession>,
    next_id: u64,
    capacity: usize,
    /// Set by `drain`; a closed registry rejects all further inserts
    closed: bool,
}

impl ClientRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Vec::new(),
            next_id: 1,
            capacity,
            closed: false,
        }
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Register a session, assigning its id and index
    ///
    /// Fails without modifying the registry when already at capacity or
    /// after a shutdown drain has closed the registry.
    pub fn insert(&mut self, mut session: ClientSession) -> Result<SessionId, RegistryError> {
        if self.closed {
            return Err(RegistryError::Closed);
        }
        if self.sessions.len() >= self.capacity {
            return Err(RegistryError::CapacityExceeded);
        }

        let id = SessionId(self.next_id);
        self.next_id += 1;

        session.id = id;
        session.index = self.sessions.len();
        self.sessions.push(session);

        Ok(id)
    }

    /// Store the task handles for a just-spawned session
    pub fn attach_workers(
        &mut self,
        id: SessionId,
        reader: tokio::task::JoinHandle<()>,
        writer: tokio::task::JoinHandle<()>,
    ) {
        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == id) {
            session.reader = Some(reader);
            session.writer = Some(writer);
        }
    }

    /// Remove a session by its stable id, shifting later sessions down
    ///
    /// Every session past the removed one has its index rewritten so that
    /// indices stay contiguous. A no-op when the id is not present, which
    /// happens when a shutdown drain has already claimed the session.
    pub fn remove(&mut self, id: SessionId) -> Option<ClientSession> {
        let position = self.sessions.iter().position(|s| s.id == id)?;
        let removed = self.sessions.remove(position);

        for session in &mut self.sessions[position..] {
            session.index -= 1;
        }

        Some(removed)
    }

    /// Send a line to every registered session
    ///
    /// Delivery is best-effort: a failed send is logged and does not stop
    /// delivery to the remaining sessions.
    pub fn broadcast(&self, line: &str) {
        for session in &self.sessions {
            if session.send(line).is_err() {
                warn!("Failed to broadcast message to {}", session.username);
            }
        }
    }

    /// Take every session out of the registry, for join-on-shutdown
    ///
    /// Also closes the registry: any insert racing the shutdown fails
    /// instead of registering on a closed server.
    pub fn drain(&mut self) -> Vec<ClientSession> {
        self.closed = true;
        std::mem::take(&mut self.sessions)
    }

    /// Iterate registered sessions in index order
    pub fn iter(&self) -> impl Iterator<Item = &ClientSession> {
        self.sessions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn session(username: &str) -> (ClientSession, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ClientSession::new(username.to_string(), tx), rx)
    }

    #[test]
    fn test_insert_assigns_contiguous_indices() {
        let mut registry = ClientRegistry::new(10);

        let mut receivers = Vec::new();
        for name in ["a", "b", "c"] {
            let (s, rx) = session(name);
            receivers.push(rx);
            registry.insert(s).unwrap();
        }

        let indices: Vec<usize> = registry.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut registry = ClientRegistry::new(2);

        let (a, _rx_a) = session("a");
        let (b, _rx_b) = session("b");
        let (c, _rx_c) = session("c");

        registry.insert(a).unwrap();
        registry.insert(b).unwrap();
        assert_eq!(registry.insert(c), Err(RegistryError::CapacityExceeded));
        assert_eq!(registry.len(), registry.capacity());
    }

    #[test]
    fn test_insert_after_drain_is_rejected() {
        let mut registry = ClientRegistry::new(10);

        let (a, _rx_a) = session("a");
        registry.insert(a).unwrap();
        registry.drain();

        let (b, _rx_b) = session("b");
        assert_eq!(registry.insert(b), Err(RegistryError::Closed));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_compacts_stably() {
        let mut registry = ClientRegistry::new(10);

        let (a, _rx_a) = session("a");
        let (b, _rx_b) = session("b");
        let (c, _rx_c) = session("c");
        let (d, _rx_d) = session("d");

        registry.insert(a).unwrap();
        let id_b = registry.insert(b).unwrap();
        registry.insert(c).unwrap();
        registry.insert(d).unwrap();

        let removed = registry.remove(id_b).unwrap();
        assert_eq!(removed.username, "b");

        let remaining: Vec<(&str, usize)> = registry
            .iter()
            .map(|s| (s.username.as_str(), s.index))
            .collect();
        assert_eq!(remaining, vec![("a", 0), ("c", 1), ("d", 2)]);
    }

    #[test]
    fn test_remove_unknown_id_is_noop() {
        let mut registry = ClientRegistry::new(10);

        let (a, _rx_a) = session("a");
        let id = registry.insert(a).unwrap();

        assert!(registry.remove(SessionId(id.0 + 1)).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_broadcast_reaches_every_session_despite_failures() {
        let mut registry = ClientRegistry::new(10);

        let (a, mut rx_a) = session("a");
        let (b, rx_b) = session("b");
        let (c, mut rx_c) = session("c");

        registry.insert(a).unwrap();
        registry.insert(b).unwrap();
        registry.insert(c).unwrap();

        // b's writer is gone; a and c must still receive the line
        drop(rx_b);
        registry.broadcast("hello");

        assert_eq!(rx_a.try_recv().unwrap(), "hello");
        assert_eq!(rx_c.try_recv().unwrap(), "hello");
    }

    #[test]
    fn test_drain_empties_registry() {
        let mut registry = ClientRegistry::new(10);

        let (a, _rx_a) = session("a");
        let (b, _rx_b) = session("b");
        registry.insert(a).unwrap();
        registry.insert(b).unwrap();

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
    }
}
