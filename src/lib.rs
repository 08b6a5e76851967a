//! Presence registry and call-signaling relay.
//!
//! The server side ([`server`]) tracks which user is reachable over which
//! WebSocket connection, fans room-scoped chat events out to everyone in a
//! room except the sender, and relays call signaling (offer, answer, ICE
//! candidates, terminal events) between exactly two users while enforcing
//! at-most-one call session per user. Signaling payloads are opaque JSON;
//! media never touches this crate.
//!
//! The client side ([`client`]) is the endpoint state machine an application
//! embeds: it drives the local negotiation object through the same handshake,
//! buffers early ICE candidates, and guarantees media teardown on every
//! terminal path.

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

pub use protocol::{ClientEvent, RoomKey, ServerEvent, UserId};
pub use server::Broker;
