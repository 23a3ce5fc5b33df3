//! Chat server implementation
//!
//! Owns the listening socket and the session registry. The accept loop
//! handshakes each new connection, registers it, and spawns a reader and a
//! writer task per session. Shutdown flips a watch channel that every loop
//! selects on, then drains the registry and joins the tasks, so no socket
//! or task outlives `close`.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::error::{ChatError, HandshakeError};
use crate::protocol;
use crate::registry::ClientRegistry;
use crate::session::{ClientSession, SessionId};

/// Tunables for a server instance
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of simultaneously registered sessions
    pub capacity: usize,
    /// Window a new connection has to send its handshake line
    pub handshake_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            capacity: protocol::DEFAULT_CAPACITY,
            handshake_timeout: protocol::HANDSHAKE_TIMEOUT,
        }
    }
}

/// State shared between the accept loop and the per-session tasks
struct ServerShared {
    registry: Mutex<ClientRegistry>,
    running: watch::Sender<bool>,
    handshake_timeout: Duration,
}

impl ServerShared {
    /// Lock the registry
    ///
    /// Poisoning cannot leave the registry inconsistent (no critical
    /// section panics part-way through a mutation), so a poisoned lock is
    /// recovered rather than propagated.
    fn registry(&self) -> MutexGuard<'_, ClientRegistry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Send a line to every registered session, best-effort
    fn broadcast(&self, line: &str) {
        self.registry().broadcast(line);
    }
}

/// A running chat server bound to one listening endpoint
pub struct ChatServer {
    /// Listening socket; taken by the accept loop, or by `close` when the
    /// loop never ran, so either path releases it
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    shared: Arc<ServerShared>,
}

impl ChatServer {
    /// Bind the listening socket and create the server
    pub async fn bind(addr: &str, config: ServerConfig) -> Result<Self, ChatError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Created server at {}", local_addr);

        let (running, _) = watch::channel(true);

        Ok(Self {
            listener: Mutex::new(Some(listener)),
            local_addr,
            shared: Arc::new(ServerShared {
                registry: Mutex::new(ClientRegistry::new(config.capacity)),
                running,
                handshake_timeout: config.handshake_timeout,
            }),
        })
    }

    /// Address the server is listening on
    ///
    /// Useful when bound to port 0 (ephemeral port).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of currently registered sessions
    pub fn client_count(&self) -> usize {
        self.shared.registry().len()
    }

    /// Accept connections until the server is closed
    ///
    /// Accept failures are logged and the loop continues; only `close`
    /// terminates it.
    pub async fn run(&self) {
        let Some(listener) = self.take_listener() else {
            return;
        };

        let mut running = self.shared.running.subscribe();

        // A close that happened before this point produces no change
        // notification, so the flag is checked once up front. Returning
        // here drops the just-taken listener.
        if !*running.borrow() {
            return;
        }

        loop {
            tokio::select! {
                _ = running.changed() => {
                    if !*running.borrow() {
                        break;
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("New TCP connection from {}", peer);
                        admit(&self.shared, stream).await;
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
        }

        debug!("Accept loop stopped");
    }

    /// Send a line to every registered session
    pub fn broadcast(&self, line: &str) {
        self.shared.broadcast(line);
    }

    /// Shut the server down
    ///
    /// Flips the running flag, takes every session out of the registry,
    /// closes each connection, and waits for every spawned task to finish.
    /// The accept loop observes the flag and exits on its own.
    pub async fn close(&self) {
        self.shared.running.send_replace(false);

        // Release the listening socket. When the accept loop holds it, the
        // loop observes the flipped flag and drops its copy on exit.
        drop(self.take_listener());

        let sessions = self.shared.registry().drain();
        for mut session in sessions {
            let reader = session.reader.take();
            let writer = session.writer.take();

            // Dropping the session closes its outbound channel, which ends
            // the writer task and shuts down the socket's write half.
            drop(session);

            if let Some(handle) = reader {
                let _ = handle.await;
            }
            if let Some(handle) = writer {
                let _ = handle.await;
            }
        }

        info!("Server closed");
    }

    fn take_listener(&self) -> Option<TcpListener> {
        self.listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}

/// Handshake a new connection and, on success, register it and spawn its tasks
async fn admit(shared: &Arc<ServerShared>, stream: TcpStream) {
    let (read_half, write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let username = match handshake(&mut lines, shared.handshake_timeout).await {
        Ok(username) => username,
        Err(e) => {
            // Dropping the socket halves closes the connection; the failed
            // attempt never enters the registry.
            error!("Handshake failed: {}", e);
            return;
        }
    };

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let session = ClientSession::new(username.clone(), outbound_tx);

    // Insert, task spawning, and handle attachment share one critical
    // section with the shutdown drain: a concurrent close either rejects
    // the insert (the drain marks the registry closed) or finds the
    // handles attached and joins them. Spawning does not block, so the
    // critical section stays bounded.
    {
        let mut registry = shared.registry();

        let id = match registry.insert(session) {
            Ok(id) => id,
            Err(e) => {
                error!("Rejecting {}: {}", username, e);
                return;
            }
        };

        let reader = tokio::spawn(reader_task(
            Arc::clone(shared),
            id,
            username.clone(),
            lines,
        ));
        let writer = tokio::spawn(writer_task(outbound_rx, write_half));
        registry.attach_workers(id, reader, writer);
    }

    let notice = protocol::connect_notice(&username);
    info!("{}", notice);

    // The new session is included in its own connect notice.
    shared.broadcast(&notice);
}

/// Read the handshake line within the given window and validate it
async fn handshake(
    lines: &mut Lines<BufReader<OwnedReadHalf>>,
    window: Duration,
) -> Result<String, HandshakeError> {
    let line = match tokio::time::timeout(window, lines.next_line()).await {
        Err(_) => return Err(HandshakeError::TimedOut),
        Ok(Err(_)) | Ok(Ok(None)) => return Err(HandshakeError::Disconnected),
        Ok(Ok(Some(line))) => line,
    };

    protocol::parse_handshake(&line).map(str::to_string)
}

/// Per-session read loop
///
/// Relays each received line to every registered session. Exits on remote
/// disconnect, read error, or server shutdown, then removes the session
/// from the registry exactly once.
async fn reader_task(
    shared: Arc<ServerShared>,
    id: SessionId,
    username: String,
    mut lines: Lines<BufReader<OwnedReadHalf>>,
) {
    let mut running = shared.running.subscribe();

    // A flip that happened before this task subscribed produces no change
    // notification, so the flag is checked once up front.
    if !*running.borrow() {
        shared.registry().remove(id);
        return;
    }

    loop {
        tokio::select! {
            _ = running.changed() => {
                if !*running.borrow() {
                    break;
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    debug!("{}: {}", username, line);
                    shared.broadcast(&line);
                }
                Ok(None) => {
                    let notice = protocol::disconnect_notice(&username);
                    info!("{}", notice);
                    shared.broadcast(&notice);
                    break;
                }
                Err(e) => {
                    error!("Connection with client {} has failed: {}", username, e);
                    break;
                }
            }
        }
    }

    // No-op when a shutdown drain has already claimed the session.
    shared.registry().remove(id);
}

/// Per-session write loop
///
/// Drains the session's outbound channel onto the socket. Ends when the
/// session is removed (channel closed) or the socket rejects a write, then
/// shuts the write half down.
async fn writer_task(mut outbound: mpsc::UnboundedReceiver<String>, mut write_half: OwnedWriteHalf) {
    while let Some(mut line) = outbound.recv().await {
        line.push('\n');
        if let Err(e) = write_half.write_all(line.as_bytes()).await {
            warn!("Failed to send message to a client: {}", e);
            break;
        }
    }

    let _ = write_half.shutdown().await;
}
