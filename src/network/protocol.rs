//! Protocol Messages
//!
//! Plain-text wire format, one message per datagram. Clients send
//! `LOGIN:<name>`, `LOGOUT:<name>`, or free text answering a prompt.
//! Server replies carry a status prefix or are unprefixed narration.

use std::fmt;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Login command prefix.
pub const LOGIN_PREFIX: &str = "LOGIN:";
/// Logout command prefix.
pub const LOGOUT_PREFIX: &str = "LOGOUT:";

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Start a session for a roster player.
    Login(String),
    /// End a session.
    Logout(String),
    /// Anything else: squad indices, fighter ids, Y/N answers.
    Text(String),
}

impl ClientMessage {
    /// Parse one datagram. Surrounding whitespace (terminal newlines) is
    /// ignored, as is whitespace around a command's name.
    pub fn parse(raw: &str) -> Self {
        let text = raw.trim();
        if let Some(name) = text.strip_prefix(LOGIN_PREFIX) {
            ClientMessage::Login(name.trim().to_string())
        } else if let Some(name) = text.strip_prefix(LOGOUT_PREFIX) {
            ClientMessage::Logout(name.trim().to_string())
        } else {
            ClientMessage::Text(text.to_string())
        }
    }

    /// Parse from raw datagram bytes. Invalid UTF-8 is replaced, not rejected.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self::parse(&String::from_utf8_lossy(data))
    }
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// `SUCCESS:` acknowledgement.
    Success(String),
    /// `ERROR:` rejection.
    Error(String),
    /// `FAILED:` rejection.
    Failed(String),
    /// `BAD INPUT:` unparsable reply, prompt repeats.
    BadInput(String),
    /// `BAD SELECTION:` parsable but unacceptable reply, prompt repeats.
    BadSelection(String),
    /// Unprefixed narration or prompt.
    Text(String),
}

impl ServerMessage {
    /// Narration helper.
    pub fn text(body: impl Into<String>) -> Self {
        ServerMessage::Text(body.into())
    }

    /// Wire prefix, if any.
    pub fn prefix(&self) -> Option<&'static str> {
        match self {
            ServerMessage::Success(_) => Some("SUCCESS"),
            ServerMessage::Error(_) => Some("ERROR"),
            ServerMessage::Failed(_) => Some("FAILED"),
            ServerMessage::BadInput(_) => Some("BAD INPUT"),
            ServerMessage::BadSelection(_) => Some("BAD SELECTION"),
            ServerMessage::Text(_) => None,
        }
    }

    /// Message body without prefix.
    pub fn body(&self) -> &str {
        match self {
            ServerMessage::Success(body)
            | ServerMessage::Error(body)
            | ServerMessage::Failed(body)
            | ServerMessage::BadInput(body)
            | ServerMessage::BadSelection(body)
            | ServerMessage::Text(body) => body,
        }
    }

    /// Encode for the wire.
    pub fn to_wire(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.prefix() {
            Some(prefix) => write!(f, "{}: {}", prefix, self.body()),
            None => f.write_str(self.body()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
