//! Seam to the platform's media/negotiation object.

use async_trait::async_trait;
use serde_json::Value;

/// The local negotiation object (an `RTCPeerConnection` or equivalent) plus
/// the media it captures. The call session drives it through the handshake;
/// media bytes never pass through this crate — once both descriptions are
/// set, audio flows directly between the endpoints.
///
/// Descriptions and candidates are opaque JSON, produced and consumed only
/// by implementations of this trait.
#[async_trait]
pub trait MediaNegotiator: Send + Sync {
    /// Acquire local media and produce the local offer description.
    async fn create_offer(&self) -> Result<Value, anyhow::Error>;

    /// Produce the local answer description. The remote offer has already
    /// been applied via [`MediaNegotiator::set_remote_description`].
    async fn create_answer(&self) -> Result<Value, anyhow::Error>;

    async fn set_remote_description(&self, description: Value) -> Result<(), anyhow::Error>;

    async fn add_ice_candidate(&self, candidate: Value) -> Result<(), anyhow::Error>;

    /// Tear down the negotiation object and release local media. Must be
    /// safe to call regardless of how far the handshake got.
    async fn close(&self);
}
