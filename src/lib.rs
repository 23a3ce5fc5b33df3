//! a-chat: Line-Oriented TCP Chat Library
//!
//! A small chat service built on tokio: a server that relays every line a
//! client sends to all registered sessions, and a client that connects and
//! exchanges line-oriented messages with it.
//!
//! # Features
//! - Plaintext handshake (`a-chat <username>`) with a bounded time window
//! - Capacity-bounded, order-preserving session registry
//! - Best-effort broadcast fan-out tolerating individual send failures
//! - Graceful shutdown that joins every per-connection task
//!
//! # Architecture
//! One reader task and one writer task per connection. The registry is the
//! only shared state, behind a single mutex held for short, non-I/O
//! critical sections; broadcasting sends through each session's channel.
//! A `watch` channel carries the running flag, and every blocking loop
//! selects on it so shutdown terminates all tasks in bounded time.
//!
//! # Example
//! ```ignore
//! use a_chat::{ChatClient, ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = ChatServer::bind("0.0.0.0:1126", ServerConfig::default())
//!         .await
//!         .unwrap();
//!
//!     tokio::select! {
//!         _ = server.run() => {}
//!         _ = tokio::signal::ctrl_c() => {}
//!     }
//!
//!     server.close().await;
//! }
//! ```

pub mod client;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

// Re-export main types for convenience
pub use client::ChatClient;
pub use error::{ChatError, HandshakeError, RegistryError};
pub use registry::ClientRegistry;
pub use server::{ChatServer, ServerConfig};
pub use session::{ClientSession, SessionId};
