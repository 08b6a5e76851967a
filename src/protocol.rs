//! Wire protocol for the relay.
//!
//! Events are a closed tagged enum on both legs, dispatched through a single
//! `handle` entry point per connection so every protocol event is covered by
//! an exhaustive match. Tags are kebab-case to match the event names the
//! clients already use (`call`, `answer-call`, `ice-candidate`, ...).
//!
//! Session descriptions and ICE candidates are carried as raw JSON values:
//! the relay decides *whether* and *to whom* to forward, never what is
//! inside.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable user identifier, supplied by the application after its login flow.
/// Opaque to the relay; never validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Caller-chosen room identifier. Membership is connection-scoped, so a
/// reconnecting client must rejoin explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomKey(String);

impl RoomKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Deterministic, order-independent key for a two-party chat: both
    /// participants compute the same key without a discovery step.
    pub fn for_pair(a: &UserId, b: &UserId) -> Self {
        let (lo, hi) = if a.as_str() <= b.as_str() {
            (a, b)
        } else {
            (b, a)
        };
        Self(format!("{lo}_{hi}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Events a connection sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Bind this connection to a user identifier. Precondition-free upsert;
    /// a later registration for the same user silently supersedes.
    Register { user_id: UserId },
    /// Subscribe this connection to a room. Idempotent.
    JoinRoom { room: RoomKey },
    Typing { room: RoomKey },
    StopTyping { room: RoomKey },
    SendMessage { room: RoomKey, message: String },
    /// Initiate a call: the target receives `incoming-call` with the offer.
    Call { to: UserId, offer: Value },
    AnswerCall { to: UserId, answer: Value },
    IceCandidate { to: UserId, candidate: Value },
    EndCall { to: UserId },
    RejectCall { to: UserId },
}

/// Events the relay delivers to a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    UserTyping,
    UserStoppedTyping,
    ReceiveMessage { message: String },
    IncomingCall { from: UserId, offer: Value },
    CallAnswered { answer: Value },
    /// Relayed verbatim, tagged with the sender's identity.
    IceCandidate { from: UserId, candidate: Value },
    CallEnded,
    CallRejected,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_room_key_is_order_independent() {
        let a = UserId::new("alice");
        let b = UserId::new("bob");
        assert_eq!(RoomKey::for_pair(&a, &b), RoomKey::for_pair(&b, &a));
        assert_eq!(RoomKey::for_pair(&a, &b).as_str(), "alice_bob");
    }

    #[test]
    fn test_client_event_wire_names() {
        let event = ClientEvent::Call {
            to: UserId::new("bob"),
            offer: json!({"sdp": "v=0", "type": "offer"}),
        };
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["type"], "call");
        assert_eq!(wire["to"], "bob");

        let event = ClientEvent::StopTyping {
            room: RoomKey::new("alice_bob"),
        };
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["type"], "stop-typing");
        assert_eq!(wire["room"], "alice_bob");
    }

    #[test]
    fn test_server_event_wire_names() {
        let wire = serde_json::to_value(ServerEvent::UserStoppedTyping).unwrap();
        assert_eq!(wire["type"], "user-stopped-typing");

        let wire = serde_json::to_value(ServerEvent::CallEnded).unwrap();
        assert_eq!(wire["type"], "call-ended");
    }

    #[test]
    fn test_offer_payload_survives_round_trip_untouched() {
        let offer = json!({"sdp": "v=0\r\no=- 42 2 IN IP4 127.0.0.1", "type": "offer"});
        let text = serde_json::to_string(&ClientEvent::Call {
            to: UserId::new("bob"),
            offer: offer.clone(),
        })
        .unwrap();
        let parsed: ClientEvent = serde_json::from_str(&text).unwrap();
        match parsed {
            ClientEvent::Call { offer: relayed, .. } => assert_eq!(relayed, offer),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let err = serde_json::from_str::<ClientEvent>(r#"{"type":"upload-image"}"#);
        assert!(err.is_err());
    }
}
