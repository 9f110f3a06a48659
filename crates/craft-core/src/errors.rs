//! Error types for the craft client.
//!
//! [`CraftError`] is the single error type surfaced by the client. The
//! variants fall into three groups:
//!
//! - **Synchronous misuse**: [`CraftError::NotConnected`],
//!   [`CraftError::AlreadyConnected`], [`CraftError::AlreadyReplied`],
//!   [`CraftError::InvalidSettings`]
//! - **Per-request completion failures**: [`CraftError::Request`],
//!   [`CraftError::ConnectionClosed`], [`CraftError::Protocol`]
//! - **Connection-level notifications**: [`CraftError::Decode`],
//!   [`CraftError::Transport`]
//!
//! The remaining variants come from parsing domain values (tokens, blocks,
//! identifiers, players).

use thiserror::Error;

/// Errors produced by the craft client and its domain types.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CraftError {
    /// The operation requires an open connection and none exists.
    #[error("the client is not connected")]
    NotConnected,

    /// `connect` was called while a connection already exists.
    #[error("the client is already connected")]
    AlreadyConnected,

    /// The server answered a request with `ok: false`.
    #[error("failed to request '{action}': {message}")]
    Request {
        /// Action name of the rejected request.
        action: String,
        /// Message supplied by the server.
        message: String,
    },

    /// The connection closed while the request was in flight.
    #[error("connection closed")]
    ConnectionClosed,

    /// An inbound frame could not be decoded.
    #[error("failed to parse event data: {0}")]
    Decode(String),

    /// The underlying socket failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A successful reply did not carry the fields the action promises.
    #[error("malformed '{action}' reply: {reason}")]
    Protocol {
        /// Action whose reply was malformed.
        action: String,
        /// What was missing or mistyped.
        reason: String,
    },

    /// The structure token could not be parsed.
    #[error("an invalid token was provided: {0}")]
    InvalidToken(String),

    /// A namespaced identifier was not of the form `namespace:id`.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// A block string could not be parsed.
    #[error("invalid block identifier: {0}")]
    InvalidBlock(String),

    /// A player was constructed with neither a name nor a UUID.
    #[error("a name or UUID has to be given for a player")]
    InvalidPlayer,

    /// The client's settings cannot be used to open a connection.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// A transaction was accepted or denied more than once.
    #[error("the transaction has already been replied to")]
    AlreadyReplied,
}

impl CraftError {
    /// Build a [`CraftError::Protocol`] for an action's reply.
    pub fn protocol(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Protocol {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error ends the request because the connection went away.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::NotConnected)
    }
}

/// Result type for craft operations.
pub type Result<T> = std::result::Result<T, CraftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_error_display() {
        let err = CraftError::Request {
            action: "get_size".into(),
            message: "no structure".into(),
        };
        assert_eq!(err.to_string(), "failed to request 'get_size': no structure");
    }

    #[test]
    fn not_connected_display() {
        assert_eq!(
            CraftError::NotConnected.to_string(),
            "the client is not connected"
        );
    }

    #[test]
    fn protocol_helper() {
        let err = CraftError::protocol("get_block", "missing 'block'");
        assert!(err.to_string().contains("get_block"));
        assert!(err.to_string().contains("missing 'block'"));
    }

    #[test]
    fn connection_loss_classification() {
        assert!(CraftError::ConnectionClosed.is_connection_loss());
        assert!(CraftError::NotConnected.is_connection_loss());
        assert!(!CraftError::AlreadyConnected.is_connection_loss());
        assert!(!CraftError::Decode("x".into()).is_connection_loss());
    }
}
