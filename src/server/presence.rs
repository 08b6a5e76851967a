//! Presence registry: which user is reachable over which connection.
//!
//! The mapping is kept genuinely reversible (forward and reverse map updated
//! under one lock) so that a superseded connection's late disconnect removes
//! only entries that still point at it, never a newer registration.

use std::collections::HashMap;

use log::debug;
use tokio::sync::RwLock;

use super::connection::ConnId;
use crate::protocol::UserId;

#[derive(Default)]
struct Maps {
    by_user: HashMap<UserId, ConnId>,
    by_conn: HashMap<ConnId, UserId>,
}

pub struct PresenceRegistry {
    inner: RwLock<Maps>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Maps::default()),
        }
    }

    /// Bind `user` to `conn`. Last writer wins: re-registering after a
    /// reconnect overwrites the forward entry without error. The superseded
    /// connection stays registered (reverse entry intact) until it
    /// disconnects; `unregister` tolerates that window.
    pub async fn register(&self, conn: ConnId, user: UserId) {
        let mut maps = self.inner.write().await;
        if let Some(old) = maps.by_user.insert(user.clone(), conn)
            && old != conn
        {
            debug!("{user} re-registered: {old} superseded by {conn}");
        }
        maps.by_conn.insert(conn, user);
    }

    /// Resolve a user to its current connection. Absence is a normal outcome
    /// (offline or never registered), not an error.
    pub async fn lookup(&self, user: &UserId) -> Option<ConnId> {
        self.inner.read().await.by_user.get(user).copied()
    }

    /// Resolve the user a connection registered as, if any.
    pub async fn user_of(&self, conn: ConnId) -> Option<UserId> {
        self.inner.read().await.by_conn.get(&conn).cloned()
    }

    /// Remove every presence entry whose value is `conn`. Returns the user
    /// the connection was registered as. Idempotent.
    pub async fn unregister(&self, conn: ConnId) -> Option<UserId> {
        let mut maps = self.inner.write().await;
        let user = maps.by_conn.remove(&conn);
        maps.by_user.retain(|_, c| *c != conn);
        user
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::connection::ConnectionRegistry;

    fn conns(n: usize) -> Vec<ConnId> {
        let registry = ConnectionRegistry::new();
        (0..n).map(|_| registry.insert().0).collect()
    }

    #[tokio::test]
    async fn test_at_most_one_connection_per_user() {
        let presence = PresenceRegistry::new();
        let c = conns(2);
        let alice = UserId::new("alice");

        presence.register(c[0], alice.clone()).await;
        presence.register(c[1], alice.clone()).await;

        assert_eq!(presence.lookup(&alice).await, Some(c[1]));
    }

    #[tokio::test]
    async fn test_stale_disconnect_keeps_newer_registration() {
        let presence = PresenceRegistry::new();
        let c = conns(2);
        let alice = UserId::new("alice");

        presence.register(c[0], alice.clone()).await;
        presence.register(c[1], alice.clone()).await;

        // The old connection finally drops; the fresh mapping survives.
        assert_eq!(presence.unregister(c[0]).await, Some(alice.clone()));
        assert_eq!(presence.lookup(&alice).await, Some(c[1]));
    }

    #[tokio::test]
    async fn test_unregister_removes_all_entries_for_connection() {
        let presence = PresenceRegistry::new();
        let c = conns(1);
        // One socket re-binding under a new identity leaves no orphan behind.
        presence.register(c[0], UserId::new("alice")).await;
        presence.register(c[0], UserId::new("alice2")).await;

        presence.unregister(c[0]).await;
        assert_eq!(presence.lookup(&UserId::new("alice")).await, None);
        assert_eq!(presence.lookup(&UserId::new("alice2")).await, None);
        assert_eq!(presence.user_of(c[0]).await, None);
    }

    #[tokio::test]
    async fn test_lookup_absent_user() {
        let presence = PresenceRegistry::new();
        assert_eq!(presence.lookup(&UserId::new("nobody")).await, None);
    }
}
