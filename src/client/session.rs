//! Client-side call session state machine.
//!
//! Mirrors the relay's handshake from one endpoint's perspective: drive the
//! local negotiation object through offer/answer, buffer ICE candidates that
//! arrive before a remote description exists, and tear everything down
//! unconditionally on any terminal path — explicit hang-up, rejection,
//! remote end, or transport loss — no matter how many of those fire.
//!
//! Methods that act on behalf of the local user build the [`ClientEvent`] to
//! send and return it; the caller owns the transport and transmits it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde_json::Value;

use super::negotiation::MediaNegotiator;
use crate::error::SessionError;
use crate::protocol::{ClientEvent, ServerEvent, UserId};

/// Where this endpoint is in the call lifecycle.
#[derive(Debug, Clone, Default)]
pub enum EndpointState {
    #[default]
    Idle,
    /// Offer sent, waiting for the remote side to act.
    Calling {
        peer: UserId,
        offer_sent_at: DateTime<Utc>,
    },
    /// Offer received, ringing locally until the user accepts or rejects.
    Ringing {
        peer: UserId,
        received_at: DateTime<Utc>,
    },
    /// Both descriptions set; media flows directly between the endpoints.
    Connected {
        peer: UserId,
        connected_at: DateTime<Utc>,
    },
}

impl EndpointState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn peer(&self) -> Option<&UserId> {
        match self {
            Self::Idle => None,
            Self::Calling { peer, .. } | Self::Ringing { peer, .. } | Self::Connected { peer, .. } => {
                Some(peer)
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Calling { .. } => "Calling",
            Self::Ringing { .. } => "Ringing",
            Self::Connected { .. } => "Connected",
        }
    }
}

/// One endpoint's call session.
pub struct CallEndpoint {
    state: EndpointState,
    negotiator: Option<Arc<dyn MediaNegotiator>>,
    /// The remote offer, held until the user accepts.
    pending_offer: Option<Value>,
    /// Candidates received before the remote description was applied.
    pending_candidates: Vec<Value>,
    remote_description_set: bool,
}

impl CallEndpoint {
    pub fn new() -> Self {
        Self {
            state: EndpointState::Idle,
            negotiator: None,
            pending_offer: None,
            pending_candidates: Vec::new(),
            remote_description_set: false,
        }
    }

    pub fn state(&self) -> &EndpointState {
        &self.state
    }

    /// Start an outgoing call: acquire media, create the local offer and
    /// return the `call` event to send.
    pub async fn call(
        &mut self,
        peer: UserId,
        negotiator: Arc<dyn MediaNegotiator>,
    ) -> Result<ClientEvent, SessionError> {
        if !self.state.is_idle() {
            return Err(SessionError::InvalidTransition {
                current: self.state.name(),
                attempted: "call",
            });
        }

        let offer = match negotiator.create_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                negotiator.close().await;
                return Err(SessionError::Negotiation(e.to_string()));
            }
        };

        self.negotiator = Some(negotiator);
        self.state = EndpointState::Calling {
            peer: peer.clone(),
            offer_sent_at: Utc::now(),
        };
        Ok(ClientEvent::Call { to: peer, offer })
    }

    /// Accept the ringing call: apply the held offer, flush any buffered
    /// candidates, produce the answer and return the `answer-call` event.
    pub async fn accept(
        &mut self,
        negotiator: Arc<dyn MediaNegotiator>,
    ) -> Result<ClientEvent, SessionError> {
        let EndpointState::Ringing { peer, .. } = &self.state else {
            return Err(SessionError::InvalidTransition {
                current: self.state.name(),
                attempted: "accept",
            });
        };
        let peer = peer.clone();
        let offer = self
            .pending_offer
            .take()
            .ok_or_else(|| SessionError::Negotiation("no pending offer".into()))?;

        if let Err(e) = negotiator.set_remote_description(offer).await {
            negotiator.close().await;
            self.reset();
            return Err(SessionError::Negotiation(e.to_string()));
        }
        self.remote_description_set = true;
        Self::flush_candidates(&negotiator, &mut self.pending_candidates).await;

        let answer = match negotiator.create_answer().await {
            Ok(answer) => answer,
            Err(e) => {
                negotiator.close().await;
                self.reset();
                return Err(SessionError::Negotiation(e.to_string()));
            }
        };

        self.negotiator = Some(negotiator);
        self.state = EndpointState::Connected {
            peer: peer.clone(),
            connected_at: Utc::now(),
        };
        Ok(ClientEvent::AnswerCall { to: peer, answer })
    }

    /// Reject the ringing call; returns the `reject-call` event to send.
    pub async fn reject(&mut self) -> Result<ClientEvent, SessionError> {
        let EndpointState::Ringing { peer, .. } = &self.state else {
            return Err(SessionError::InvalidTransition {
                current: self.state.name(),
                attempted: "reject",
            });
        };
        let peer = peer.clone();
        self.teardown().await;
        Ok(ClientEvent::RejectCall { to: peer })
    }

    /// Hang up. Returns the `end-call` event to send, or None when there is
    /// nothing to end — ending twice is a no-op, not an error.
    pub async fn end(&mut self) -> Option<ClientEvent> {
        let peer = self.state.peer().cloned()?;
        self.teardown().await;
        Some(ClientEvent::EndCall { to: peer })
    }

    /// Feed a relay event into the session. Room-scoped chat events are not
    /// call signaling and are ignored here.
    pub async fn apply(&mut self, event: ServerEvent) -> Result<(), SessionError> {
        match event {
            ServerEvent::IncomingCall { from, offer } => {
                self.handle_incoming(from, offer);
                Ok(())
            }
            ServerEvent::CallAnswered { answer } => self.handle_answered(answer).await,
            ServerEvent::IceCandidate { from, candidate } => {
                self.handle_candidate(&from, candidate).await;
                Ok(())
            }
            ServerEvent::CallEnded | ServerEvent::CallRejected => {
                self.teardown().await;
                Ok(())
            }
            ServerEvent::UserTyping
            | ServerEvent::UserStoppedTyping
            | ServerEvent::ReceiveMessage { .. } => Ok(()),
        }
    }

    /// The underlying transport dropped: release everything. Safe to call
    /// however many close paths race into it.
    pub async fn handle_transport_lost(&mut self) {
        self.teardown().await;
    }

    fn handle_incoming(&mut self, from: UserId, offer: Value) {
        // Already in a call (or dialing): drop the second offer rather than
        // disturb the existing session.
        if !self.state.is_idle() || self.negotiator.is_some() {
            debug!("incoming call from {from} dropped: endpoint is {}", self.state.name());
            return;
        }
        self.pending_offer = Some(offer);
        self.state = EndpointState::Ringing {
            peer: from,
            received_at: Utc::now(),
        };
    }

    async fn handle_answered(&mut self, answer: Value) -> Result<(), SessionError> {
        let EndpointState::Calling { peer, .. } = &self.state else {
            debug!("call-answered while {}, dropping as stale", self.state.name());
            return Ok(());
        };
        let peer = peer.clone();
        let negotiator = self
            .negotiator
            .clone()
            .ok_or_else(|| SessionError::Negotiation("no negotiation object".into()))?;

        if let Err(e) = negotiator.set_remote_description(answer).await {
            self.teardown().await;
            return Err(SessionError::Negotiation(e.to_string()));
        }
        self.remote_description_set = true;
        Self::flush_candidates(&negotiator, &mut self.pending_candidates).await;

        self.state = EndpointState::Connected {
            peer,
            connected_at: Utc::now(),
        };
        Ok(())
    }

    async fn handle_candidate(&mut self, from: &UserId, candidate: Value) {
        if self.state.peer() != Some(from) {
            debug!("candidate from {from} dropped: no session with them");
            return;
        }
        if self.remote_description_set
            && let Some(negotiator) = &self.negotiator
        {
            if let Err(e) = negotiator.add_ice_candidate(candidate).await {
                warn!("failed to apply candidate from {from}: {e}");
            }
        } else {
            self.pending_candidates.push(candidate);
        }
    }

    async fn flush_candidates(negotiator: &Arc<dyn MediaNegotiator>, pending: &mut Vec<Value>) {
        for candidate in pending.drain(..) {
            if let Err(e) = negotiator.add_ice_candidate(candidate).await {
                warn!("failed to apply buffered candidate: {e}");
            }
        }
    }

    async fn teardown(&mut self) {
        if let Some(negotiator) = self.negotiator.take() {
            negotiator.close().await;
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.negotiator = None;
        self.pending_offer = None;
        self.pending_candidates.clear();
        self.remote_description_set = false;
        self.state = EndpointState::Idle;
    }
}

impl Default for CallEndpoint {
    fn default() -> Self {
        Self::new()
    }
}
