//! Chat client implementation
//!
//! Connects to a server, sends the handshake line, and splits the
//! connection: a background task reads incoming lines into a channel while
//! the caller keeps the write half for sending.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::ChatError;
use crate::protocol;

/// A connected, handshaken chat client
#[derive(Debug)]
pub struct ChatClient {
    username: String,
    writer: OwnedWriteHalf,
    incoming: Option<mpsc::UnboundedReceiver<String>>,
    running: watch::Sender<bool>,
    reader: Option<JoinHandle<()>>,
}

impl ChatClient {
    /// Connect to a server and perform the handshake
    ///
    /// The username is validated before any connection is attempted.
    pub async fn connect(host: &str, port: u16, username: &str) -> Result<Self, ChatError> {
        protocol::validate_username(username).map_err(|_| ChatError::InvalidUsername)?;

        let stream = TcpStream::connect((host, port)).await?;
        let (read_half, mut write_half) = stream.into_split();

        let handshake = format!("{}\n", protocol::handshake_line(username));
        write_half.write_all(handshake.as_bytes()).await?;

        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let (running, running_rx) = watch::channel(true);
        let reader = tokio::spawn(receive_loop(read_half, incoming_tx, running_rx));

        info!("Connected to {}:{} as {}", host, port, username);

        Ok(Self {
            username: username.to_string(),
            writer: write_half,
            incoming: Some(incoming_rx),
            running,
            reader: Some(reader),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Send one chat message
    pub async fn send(&mut self, text: &str) -> Result<(), ChatError> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        Ok(())
    }

    /// Receive the next incoming line
    ///
    /// Returns `None` once the server has closed the connection, or if the
    /// incoming stream was taken with [`take_incoming`](Self::take_incoming).
    pub async fn recv(&mut self) -> Option<String> {
        match self.incoming.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Take ownership of the incoming-message stream
    ///
    /// Lets a caller consume incoming lines concurrently with sending.
    /// Returns `None` if already taken.
    pub fn take_incoming(&mut self) -> Option<mpsc::UnboundedReceiver<String>> {
        self.incoming.take()
    }

    /// Disconnect, shutting down the socket and joining the receive task
    pub async fn close(mut self) {
        self.running.send_replace(false);
        let _ = self.writer.shutdown().await;

        if let Some(handle) = self.reader.take() {
            let _ = handle.await;
        }

        info!("Disconnected {}", self.username);
    }
}

/// Background loop forwarding received lines into the incoming channel
async fn receive_loop(
    read_half: OwnedReadHalf,
    incoming: mpsc::UnboundedSender<String>,
    mut running: watch::Receiver<bool>,
) {
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            _ = running.changed() => {
                if !*running.borrow() {
                    break;
                }
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if incoming.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    info!("Server closed the connection");
                    break;
                }
                Err(e) => {
                    error!("Failed to receive message: {}", e);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_rejects_empty_username() {
        let err = ChatClient::connect("127.0.0.1", 1, "").await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidUsername));
    }

    #[tokio::test]
    async fn test_connect_rejects_oversized_username() {
        let username = "a".repeat(protocol::MAX_USERNAME_LEN + 1);
        let err = ChatClient::connect("127.0.0.1", 1, &username)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::InvalidUsername));
    }
}
