//! Error types.
//!
//! Nothing in the relay core is fatal to the process: broker-side handling is
//! uniformly "drop and continue", so errors here surface only at the socket
//! edge and on the client session's local API.

use thiserror::Error;

/// Client call-session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A local action was attempted from a state that does not allow it
    /// (e.g. `accept` while not ringing).
    #[error("invalid call transition: {attempted} while {current}")]
    InvalidTransition {
        current: &'static str,
        attempted: &'static str,
    },

    /// The platform negotiation object failed.
    #[error("negotiation failed: {0}")]
    Negotiation(String),
}

/// Socket-edge errors for a single connection. Connection-local by design:
/// one misbehaving connection never affects another's state.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
