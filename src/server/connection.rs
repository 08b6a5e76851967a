//! Connection lifecycle: identifier allocation and outbound sinks.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use log::trace;
use tokio::sync::mpsc;

use crate::protocol::ServerEvent;

/// Identifier for one live transport connection. Allocated monotonically and
/// never reused for the lifetime of the process, so signaling in flight for a
/// dead connection can never reach a later one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Outbound channel for one connection. The socket edge (or a test) drains
/// the receiving end.
pub type EventSink = mpsc::UnboundedSender<ServerEvent>;

/// Owns the set of live connections and their outbound sinks.
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    sinks: DashMap<ConnId, EventSink>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sinks: DashMap::new(),
        }
    }

    /// Admit a new connection: allocates its identifier and returns the
    /// receiving end of its outbound channel.
    pub fn insert(&self) -> (ConnId, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn = ConnId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.sinks.insert(conn, tx);
        (conn, rx)
    }

    /// Remove a connection's sink. Returns false if it was already removed,
    /// which lets callers deliver disconnect cleanup exactly once.
    pub fn remove(&self, conn: ConnId) -> bool {
        self.sinks.remove(&conn).is_some()
    }

    /// Best-effort delivery. A missing or closed sink is a silent drop: the
    /// connection is gone and cleanup will (or did) run.
    pub fn send(&self, conn: ConnId, event: ServerEvent) {
        if let Some(sink) = self.sinks.get(&conn) {
            if sink.send(event).is_err() {
                trace!("{conn} sink closed, dropping event");
            }
        } else {
            trace!("{conn} unknown, dropping event");
        }
    }

    pub fn contains(&self, conn: ConnId) -> bool {
        self.sinks.contains_key(&conn)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
