//! Room router: fan-out of room-scoped events to every member except the
//! sender. The exclusion is what keeps a client from seeing an echo of its
//! own typing or live-text events.
//!
//! There is no explicit leave; membership is torn down with the connection.
//! An empty room is simply absent from the map.

use std::collections::{HashMap, HashSet};

use log::trace;
use tokio::sync::RwLock;

use super::connection::{ConnId, ConnectionRegistry};
use crate::protocol::{RoomKey, ServerEvent};

pub struct RoomRouter {
    rooms: RwLock<HashMap<RoomKey, HashSet<ConnId>>>,
}

impl RoomRouter {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Add a connection to a room. Idempotent.
    pub async fn join(&self, conn: ConnId, room: RoomKey) {
        self.rooms.write().await.entry(room).or_default().insert(conn);
    }

    /// Deliver an event to every member of `room` except `sender`. A missing
    /// room is a no-op.
    pub async fn broadcast(
        &self,
        connections: &ConnectionRegistry,
        sender: ConnId,
        room: &RoomKey,
        event: ServerEvent,
    ) {
        let rooms = self.rooms.read().await;
        let Some(members) = rooms.get(room) else {
            trace!("room {room} has no members, dropping broadcast");
            return;
        };
        for member in members {
            if *member != sender {
                connections.send(*member, event.clone());
            }
        }
    }

    /// Drop the connection from every room it joined, removing rooms that
    /// become empty. Idempotent.
    pub async fn remove_connection(&self, conn: ConnId) {
        let mut rooms = self.rooms.write().await;
        rooms.retain(|_, members| {
            members.remove(&conn);
            !members.is_empty()
        });
    }

    #[cfg(test)]
    pub(crate) async fn is_member(&self, conn: ConnId, room: &RoomKey) -> bool {
        self.rooms
            .read()
            .await
            .get(room)
            .is_some_and(|members| members.contains(&conn))
    }

    #[cfg(test)]
    pub(crate) async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl Default for RoomRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let connections = ConnectionRegistry::new();
        let rooms = RoomRouter::new();
        let room = RoomKey::new("alice_bob");

        let (a, mut rx_a) = connections.insert();
        let (b, mut rx_b) = connections.insert();
        rooms.join(a, room.clone()).await;
        rooms.join(b, room.clone()).await;

        rooms
            .broadcast(&connections, a, &room, ServerEvent::UserTyping)
            .await;

        assert_eq!(rx_b.try_recv().unwrap(), ServerEvent::UserTyping);
        assert!(rx_a.try_recv().is_err(), "sender must not see its own event");
    }

    #[tokio::test]
    async fn test_join_is_idempotent() {
        let connections = ConnectionRegistry::new();
        let rooms = RoomRouter::new();
        let room = RoomKey::new("alice_bob");

        let (a, _rx_a) = connections.insert();
        let (b, mut rx_b) = connections.insert();
        rooms.join(a, room.clone()).await;
        rooms.join(a, room.clone()).await;
        rooms.join(b, room.clone()).await;

        rooms
            .broadcast(
                &connections,
                a,
                &room,
                ServerEvent::ReceiveMessage {
                    message: "hi".into(),
                },
            )
            .await;

        assert!(rx_b.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err(), "double join must not double deliver");
    }

    #[tokio::test]
    async fn test_teardown_removes_empty_rooms() {
        let connections = ConnectionRegistry::new();
        let rooms = RoomRouter::new();
        let room = RoomKey::new("alice_bob");

        let (a, _rx) = connections.insert();
        rooms.join(a, room.clone()).await;
        assert!(rooms.is_member(a, &room).await);

        rooms.remove_connection(a).await;
        assert!(!rooms.is_member(a, &room).await);
        assert_eq!(rooms.room_count().await, 0);

        // Idempotent.
        rooms.remove_connection(a).await;
    }

    #[tokio::test]
    async fn test_broadcast_to_absent_room_is_noop() {
        let connections = ConnectionRegistry::new();
        let rooms = RoomRouter::new();
        let (a, _rx) = connections.insert();
        rooms
            .broadcast(&connections, a, &RoomKey::new("nowhere"), ServerEvent::UserTyping)
            .await;
    }
}
