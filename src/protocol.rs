//! Wire protocol definitions
//!
//! The protocol is plaintext and newline-delimited. The first line a client
//! sends is the handshake `a-chat <username>`; every later line is a chat
//! message relayed verbatim to all registered sessions.

use std::time::Duration;

use crate::error::HandshakeError;

/// Default server port
pub const DEFAULT_PORT: u16 = 1126;

/// Maximum number of simultaneously registered sessions
pub const DEFAULT_CAPACITY: usize = 100;

/// Handshake token, including the separating space
pub const HANDSHAKE_PREFIX: &str = "a-chat ";

/// Maximum username length in bytes (inclusive)
pub const MAX_USERNAME_LEN: usize = 511;

/// Time window a new connection has to complete the handshake
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Parse a handshake line into a validated username
///
/// The line must start with `a-chat ` and the remainder (which may itself
/// contain spaces) is the username, 1..=511 bytes.
pub fn parse_handshake(line: &str) -> Result<&str, HandshakeError> {
    if line.len() < HANDSHAKE_PREFIX.len() || !line.starts_with(HANDSHAKE_PREFIX) {
        return Err(HandshakeError::Malformed);
    }

    let username = &line[HANDSHAKE_PREFIX.len()..];
    validate_username(username)?;

    Ok(username)
}

/// Check that a username is 1..=511 bytes with no embedded newline
pub fn validate_username(username: &str) -> Result<(), HandshakeError> {
    if username.is_empty() || username.len() > MAX_USERNAME_LEN || username.contains('\n') {
        return Err(HandshakeError::InvalidUsername);
    }
    Ok(())
}

/// Build the handshake line a client sends after connecting
pub fn handshake_line(username: &str) -> String {
    format!("{HANDSHAKE_PREFIX}{username}")
}

/// Notice broadcast when a client completes the handshake
pub fn connect_notice(username: &str) -> String {
    format!("{username} has connected")
}

/// Notice broadcast when a client's connection reaches end of stream
pub fn disconnect_notice(username: &str) -> String {
    format!("{username} has disconnected")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_handshake() {
        assert_eq!(parse_handshake("a-chat bob"), Ok("bob"));
    }

    #[test]
    fn test_username_may_contain_spaces() {
        assert_eq!(parse_handshake("a-chat bob the builder"), Ok("bob the builder"));
    }

    #[test]
    fn test_empty_line_is_malformed() {
        assert_eq!(parse_handshake(""), Err(HandshakeError::Malformed));
    }

    #[test]
    fn test_wrong_token_is_malformed() {
        assert_eq!(parse_handshake("a-cha x"), Err(HandshakeError::Malformed));
    }

    #[test]
    fn test_missing_separator_is_malformed() {
        assert_eq!(parse_handshake("a-chatbob"), Err(HandshakeError::Malformed));
    }

    #[test]
    fn test_empty_username_rejected() {
        assert_eq!(parse_handshake("a-chat "), Err(HandshakeError::InvalidUsername));
    }

    #[test]
    fn test_username_length_boundary() {
        let max = "a".repeat(MAX_USERNAME_LEN);
        assert_eq!(parse_handshake(&handshake_line(&max)), Ok(max.as_str()));

        let too_long = "a".repeat(MAX_USERNAME_LEN + 1);
        assert_eq!(
            parse_handshake(&handshake_line(&too_long)),
            Err(HandshakeError::InvalidUsername)
        );
    }

    #[test]
    fn test_notices() {
        assert_eq!(connect_notice("alice"), "alice has connected");
        assert_eq!(disconnect_notice("alice"), "alice has disconnected");
    }
}
