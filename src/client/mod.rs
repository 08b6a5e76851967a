//! Client-side call session: the endpoint state machine that mirrors the
//! relay's handshake and drives a platform negotiation object through it.

pub mod negotiation;
pub mod session;

pub use negotiation::MediaNegotiator;
pub use session::{CallEndpoint, EndpointState};
