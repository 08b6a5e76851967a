//! The broker: presence registry and call-signaling relay.
//!
//! All broker state lives in four subsystems, each behind its own lock and
//! reachable only through its method surface. Every protocol event enters
//! through [`Broker::handle`], an exhaustive match over the closed event
//! type, so adding a wire event without handling it fails to compile.

pub mod calls;
pub mod connection;
pub mod presence;
pub mod rooms;
pub mod ws;

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::protocol::{ClientEvent, ServerEvent, UserId};
use calls::CallCoordinator;
use connection::{ConnId, ConnectionRegistry};
use presence::PresenceRegistry;
use rooms::RoomRouter;

pub struct Broker {
    connections: ConnectionRegistry,
    presence: PresenceRegistry,
    rooms: RoomRouter,
    calls: CallCoordinator,
}

impl Broker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connections: ConnectionRegistry::new(),
            presence: PresenceRegistry::new(),
            rooms: RoomRouter::new(),
            calls: CallCoordinator::new(),
        })
    }

    /// Admit a new transport connection. The caller drains the returned
    /// receiver and must call [`Broker::disconnect`] when the link dies.
    pub fn connect(&self) -> (ConnId, mpsc::UnboundedReceiver<ServerEvent>) {
        self.connections.insert()
    }

    /// Tear down a connection. Runs at most once per connection regardless
    /// of how many close paths race into it; presence, rooms and calls each
    /// clean up independently and idempotently.
    pub async fn disconnect(&self, conn: ConnId) {
        if !self.connections.remove(conn) {
            return;
        }
        let user = self.presence.unregister(conn).await;
        self.rooms.remove_connection(conn).await;
        if let Some(user) = user {
            // Only the user's current connection owns call state. A stale
            // connection superseded by a reconnect must not tear down a call
            // running over the newer one.
            if self.presence.lookup(&user).await.is_none()
                && let Some(peer) = self.calls.drop_user(&user).await
                && let Some(peer_conn) = self.presence.lookup(&peer).await
            {
                self.connections.send(peer_conn, ServerEvent::CallEnded);
            }
        }
        info!("{conn} disconnected");
    }

    /// Single entry point for everything a connection sends.
    pub async fn handle(&self, conn: ConnId, event: ClientEvent) {
        match event {
            ClientEvent::Register { user_id } => {
                debug!("{conn} registered as {user_id}");
                self.presence.register(conn, user_id).await;
            }
            ClientEvent::JoinRoom { room } => {
                debug!("{conn} joined room {room}");
                self.rooms.join(conn, room).await;
            }
            ClientEvent::Typing { room } => {
                self.rooms
                    .broadcast(&self.connections, conn, &room, ServerEvent::UserTyping)
                    .await;
            }
            ClientEvent::StopTyping { room } => {
                self.rooms
                    .broadcast(&self.connections, conn, &room, ServerEvent::UserStoppedTyping)
                    .await;
            }
            ClientEvent::SendMessage { room, message } => {
                self.rooms
                    .broadcast(
                        &self.connections,
                        conn,
                        &room,
                        ServerEvent::ReceiveMessage { message },
                    )
                    .await;
            }
            ClientEvent::Call { to, offer } => {
                let Some(from) = self.sender_identity(conn).await else {
                    return;
                };
                // An offline target is a normal outcome: no relay, no
                // session, and the caller's timeout UX takes it from here.
                let Some(target) = self.presence.lookup(&to).await else {
                    debug!("call {from} -> {to} dropped: target not present");
                    return;
                };
                if !self.calls.begin(from.clone(), to.clone()).await {
                    return;
                }
                info!("relaying call {from} -> {to}");
                self.connections
                    .send(target, ServerEvent::IncomingCall { from, offer });
            }
            ClientEvent::AnswerCall { to, answer } => {
                let Some(from) = self.sender_identity(conn).await else {
                    return;
                };
                if !self.calls.accept(&from, &to).await {
                    return;
                }
                info!("relaying answer {from} -> {to}");
                if let Some(target) = self.presence.lookup(&to).await {
                    self.connections
                        .send(target, ServerEvent::CallAnswered { answer });
                }
            }
            ClientEvent::IceCandidate { to, candidate } => {
                let Some(from) = self.sender_identity(conn).await else {
                    return;
                };
                if !self.calls.has_session(&from, &to).await {
                    debug!("candidate {from} -> {to} dropped: no session");
                    return;
                }
                if let Some(target) = self.presence.lookup(&to).await {
                    self.connections
                        .send(target, ServerEvent::IceCandidate { from, candidate });
                }
            }
            ClientEvent::EndCall { to } => {
                let Some(from) = self.sender_identity(conn).await else {
                    return;
                };
                if !self.calls.end(&from, &to).await {
                    return;
                }
                info!("call {from} -> {to} ended");
                if let Some(target) = self.presence.lookup(&to).await {
                    self.connections.send(target, ServerEvent::CallEnded);
                }
            }
            ClientEvent::RejectCall { to } => {
                let Some(from) = self.sender_identity(conn).await else {
                    return;
                };
                if !self.calls.reject(&from, &to).await {
                    return;
                }
                info!("call {to} -> {from} rejected");
                if let Some(target) = self.presence.lookup(&to).await {
                    self.connections.send(target, ServerEvent::CallRejected);
                }
            }
        }
    }

    /// Call signaling requires a registered sender; anything else is dropped.
    async fn sender_identity(&self, conn: ConnId) -> Option<UserId> {
        let user = self.presence.user_of(conn).await;
        if user.is_none() {
            warn!("{conn} sent call signaling before registering, dropping");
        }
        user
    }
}
