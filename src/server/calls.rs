//! Call coordinator: per-user session bookkeeping for the signaling relay.
//!
//! The coordinator never stores or inspects call content. It tracks just
//! enough state to enforce at-most-one call session per user and to decide
//! whether a signaling payload should still be forwarded. Everything else is
//! the clients' concern.

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::protocol::UserId;

/// Which side of the handshake a user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallRole {
    Initiator,
    Responder,
}

/// Broker-side phase of one user's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CallPhase {
    /// Offer relayed, waiting for the responder to act.
    Calling,
    /// Offer delivered, ringing at this user.
    Ringing,
    /// Answer relayed; media flows directly between the endpoints.
    Connected,
}

/// One user's half of a call session. Exists only for the duration of the
/// negotiation plus the connected call; destroyed on any terminal event.
#[derive(Debug, Clone, Serialize)]
pub struct CallSession {
    pub peer: UserId,
    pub role: CallRole,
    pub phase: CallPhase,
    pub created_at: DateTime<Utc>,
}

impl CallSession {
    fn new(peer: UserId, role: CallRole, phase: CallPhase) -> Self {
        Self {
            peer,
            role,
            phase,
            created_at: Utc::now(),
        }
    }
}

pub struct CallCoordinator {
    sessions: RwLock<HashMap<UserId, CallSession>>,
}

impl CallCoordinator {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Open a session pair for a relayed offer: `from` is Calling, `to` is
    /// Ringing. Returns false (and changes nothing) when either party
    /// already has a session — a second initiation is dropped rather than
    /// allowed to corrupt the existing one. Under glare the offer that
    /// arrives first wins and the later initiation is the one dropped.
    pub async fn begin(&self, from: UserId, to: UserId) -> bool {
        if from == to {
            debug!("{from} tried to call itself, dropping");
            return false;
        }
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&from) || sessions.contains_key(&to) {
            debug!("call {from} -> {to} dropped: a party is already in a session");
            return false;
        }
        sessions.insert(
            from.clone(),
            CallSession::new(to.clone(), CallRole::Initiator, CallPhase::Calling),
        );
        sessions.insert(
            to,
            CallSession::new(from, CallRole::Responder, CallPhase::Ringing),
        );
        true
    }

    /// The responder accepted: both halves move to Connected. Returns false
    /// for stale or mismatched signaling (no such session, wrong peer, wrong
    /// phase), in which case nothing is relayed.
    pub async fn accept(&self, from: &UserId, to: &UserId) -> bool {
        let mut sessions = self.sessions.write().await;
        let ok = matches!(
            sessions.get(from),
            Some(session) if session.peer == *to && session.phase == CallPhase::Ringing
        ) && matches!(
            sessions.get(to),
            Some(session) if session.peer == *from && session.phase == CallPhase::Calling
        );
        if !ok {
            debug!("answer {from} -> {to} dropped: no matching ringing session");
            return false;
        }
        if let Some(session) = sessions.get_mut(from) {
            session.phase = CallPhase::Connected;
        }
        if let Some(session) = sessions.get_mut(to) {
            session.phase = CallPhase::Connected;
        }
        true
    }

    /// The responder rejected while ringing: destroy both halves. Returns
    /// false when there was nothing to reject.
    pub async fn reject(&self, from: &UserId, to: &UserId) -> bool {
        let mut sessions = self.sessions.write().await;
        let ok = matches!(
            sessions.get(from),
            Some(session) if session.peer == *to && session.phase == CallPhase::Ringing
        );
        if !ok {
            debug!("reject {from} -> {to} dropped: no matching ringing session");
            return false;
        }
        sessions.remove(from);
        sessions.remove(to);
        true
    }

    /// A party ended the call. Valid from any non-idle phase (ending while
    /// still Calling is a cancel). Destroys both halves; a repeat delivery
    /// finds no session and is a no-op, so terminal events stay idempotent.
    pub async fn end(&self, from: &UserId, to: &UserId) -> bool {
        let mut sessions = self.sessions.write().await;
        let ok = matches!(sessions.get(from), Some(session) if session.peer == *to);
        if !ok {
            debug!("end {from} -> {to} dropped: no such session");
            return false;
        }
        sessions.remove(from);
        sessions.remove(to);
        true
    }

    /// Whether `user` has a live session with `peer`, in any phase. Gates
    /// ICE-candidate relay so stale candidates are discarded.
    pub async fn has_session(&self, user: &UserId, peer: &UserId) -> bool {
        matches!(
            self.sessions.read().await.get(user),
            Some(session) if session.peer == *peer
        )
    }

    /// Disconnect cleanup: destroy the user's session pair and return the
    /// peer so the caller can relay a best-effort `call-ended`. Idempotent.
    pub async fn drop_user(&self, user: &UserId) -> Option<UserId> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.remove(user)?;
        sessions.remove(&session.peer);
        Some(session.peer)
    }

    pub async fn session_of(&self, user: &UserId) -> Option<CallSession> {
        self.sessions.read().await.get(user).cloned()
    }
}

impl Default for CallCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserId {
        UserId::new("alice")
    }

    fn bob() -> UserId {
        UserId::new("bob")
    }

    #[tokio::test]
    async fn test_begin_creates_both_halves() {
        let calls = CallCoordinator::new();
        assert!(calls.begin(alice(), bob()).await);

        let a = calls.session_of(&alice()).await.unwrap();
        assert_eq!(a.role, CallRole::Initiator);
        assert_eq!(a.phase, CallPhase::Calling);
        assert_eq!(a.peer, bob());

        let b = calls.session_of(&bob()).await.unwrap();
        assert_eq!(b.role, CallRole::Responder);
        assert_eq!(b.phase, CallPhase::Ringing);
    }

    #[tokio::test]
    async fn test_session_exclusivity() {
        let calls = CallCoordinator::new();
        let carol = UserId::new("carol");
        assert!(calls.begin(alice(), bob()).await);

        // Either party being busy drops the new initiation entirely.
        assert!(!calls.begin(carol.clone(), bob()).await);
        assert!(!calls.begin(alice(), carol.clone()).await);
        assert!(calls.session_of(&carol).await.is_none());
    }

    #[tokio::test]
    async fn test_glare_second_initiation_dropped() {
        let calls = CallCoordinator::new();
        assert!(calls.begin(alice(), bob()).await);
        assert!(!calls.begin(bob(), alice()).await);

        // The surviving offer still resolves normally.
        assert!(calls.accept(&bob(), &alice()).await);
        assert_eq!(
            calls.session_of(&alice()).await.unwrap().phase,
            CallPhase::Connected
        );
    }

    #[tokio::test]
    async fn test_accept_requires_matching_ringing_session() {
        let calls = CallCoordinator::new();
        assert!(!calls.accept(&bob(), &alice()).await, "no session yet");

        calls.begin(alice(), bob()).await;
        assert!(!calls.accept(&alice(), &bob()).await, "initiator cannot accept");
        assert!(calls.accept(&bob(), &alice()).await);
        assert!(!calls.accept(&bob(), &alice()).await, "already connected");
    }

    #[tokio::test]
    async fn test_reject_destroys_both_halves() {
        let calls = CallCoordinator::new();
        calls.begin(alice(), bob()).await;
        assert!(calls.reject(&bob(), &alice()).await);
        assert!(calls.session_of(&alice()).await.is_none());
        assert!(calls.session_of(&bob()).await.is_none());
        assert!(!calls.reject(&bob(), &alice()).await);
    }

    #[tokio::test]
    async fn test_end_is_idempotent() {
        let calls = CallCoordinator::new();
        calls.begin(alice(), bob()).await;
        calls.accept(&bob(), &alice()).await;

        assert!(calls.end(&alice(), &bob()).await);
        assert!(!calls.end(&alice(), &bob()).await);
        assert!(!calls.end(&bob(), &alice()).await);
    }

    #[tokio::test]
    async fn test_end_while_calling_is_a_cancel() {
        let calls = CallCoordinator::new();
        calls.begin(alice(), bob()).await;
        assert!(calls.end(&alice(), &bob()).await);
        assert!(calls.session_of(&bob()).await.is_none());
    }

    #[tokio::test]
    async fn test_drop_user_returns_peer() {
        let calls = CallCoordinator::new();
        calls.begin(alice(), bob()).await;
        assert_eq!(calls.drop_user(&alice()).await, Some(bob()));
        assert!(calls.session_of(&bob()).await.is_none());
        assert_eq!(calls.drop_user(&alice()).await, None);
    }

    #[tokio::test]
    async fn test_ice_gate_follows_session_lifetime() {
        let calls = CallCoordinator::new();
        assert!(!calls.has_session(&alice(), &bob()).await);

        calls.begin(alice(), bob()).await;
        assert!(calls.has_session(&alice(), &bob()).await);
        assert!(calls.has_session(&bob(), &alice()).await);

        calls.end(&alice(), &bob()).await;
        assert!(!calls.has_session(&bob(), &alice()).await);
    }
}
