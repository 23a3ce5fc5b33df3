//! a-chat - Entry Point
//!
//! Hosts or joins a chat session depending on the chosen subcommand.

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

use a_chat::{protocol, ChatClient, ChatServer, ServerConfig};

#[derive(Parser)]
#[command(author, version, about = "Host or join an a-chat session")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Host an a-chat session
    Server {
        /// Address to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value_t = protocol::DEFAULT_PORT)]
        port: u16,
    },
    /// Join an a-chat session
    Client {
        /// Server address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Server port
        #[arg(short, long, default_value_t = protocol::DEFAULT_PORT)]
        port: u16,
        /// Display name sent in the handshake
        #[arg(short, long)]
        username: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level, e.g. RUST_LOG=a_chat=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("a_chat=info")),
        )
        .init();

    match Cli::parse().command {
        Command::Server { host, port } => run_server(&host, port).await,
        Command::Client {
            host,
            port,
            username,
        } => run_client(&host, port, &username).await,
    }
}

/// Run the server until Ctrl+C, then shut it down gracefully
async fn run_server(host: &str, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let server = ChatServer::bind(&format!("{host}:{port}"), ServerConfig::default()).await?;

    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    server.close().await;
    Ok(())
}

/// Connect to a server and relay between stdin and the chat session
///
/// Typing `exit` (or closing stdin) leaves the session.
async fn run_client(host: &str, port: u16, username: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = ChatClient::connect(host, port, username).await?;
    let mut incoming = client
        .take_incoming()
        .ok_or("incoming stream already taken")?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            message = incoming.recv() => match message {
                Some(line) => println!("{line}"),
                None => break,
            },
            line = stdin.next_line() => match line? {
                Some(line) if line == "exit" => break,
                Some(line) => client.send(&line).await?,
                None => break,
            }
        }
    }

    client.close().await;
    Ok(())
}
