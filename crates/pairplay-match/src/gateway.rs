//! Addressing and delivery.
//!
//! Every connection handler owns the receiving half of an unbounded
//! channel; the gateway holds the sending half. Sending never awaits, so
//! the core can deliver while holding its state lock. A connection counts
//! as live for as long as its receiver exists.
//!
//! Session groups stand in for broadcast rooms: each game session has one
//! group, built when the pair is formed and removed at teardown.

use std::collections::{HashMap, HashSet};

use pairplay_protocol::{Channel, Payload, PlayerId, SessionId, SystemMessage};
use pairplay_session::ConnectionRegistry;
use pairplay_transport::ConnectionId;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// What the gateway hands to a connection handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Encode and send.
    Message { payload: Payload, channel: Channel },
    /// Close the transport. Nothing follows.
    Close { reason: String },
}

pub type OutboundSender = mpsc::UnboundedSender<Outbound>;
pub type OutboundReceiver = mpsc::UnboundedReceiver<Outbound>;

/// The connections taking part in one session, keyed by player so a
/// reconnect can swap a player's connection in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionGroup {
    members: Vec<(PlayerId, ConnectionId)>,
}

impl SessionGroup {
    /// Binds `player` to `connection_id`, replacing any previous binding.
    pub fn bind(&mut self, player: PlayerId, connection_id: ConnectionId) {
        match self.members.iter_mut().find(|(p, _)| *p == player) {
            Some(member) => member.1 = connection_id,
            None => self.members.push((player, connection_id)),
        }
    }

    pub fn connection_of(&self, player: &PlayerId) -> Option<ConnectionId> {
        self.members
            .iter()
            .find(|(p, _)| p == player)
            .map(|(_, c)| *c)
    }

    pub fn connections(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.members.iter().map(|(_, c)| *c)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Gateway {
    connections: HashMap<ConnectionId, OutboundSender>,
    groups: HashMap<SessionId, SessionGroup>,
}

impl Gateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `connection_id` reachable.
    pub fn attach(&mut self, connection_id: ConnectionId, sender: OutboundSender) {
        self.connections.insert(connection_id, sender);
    }

    /// Forgets `connection_id`. Group bindings are left alone; the
    /// session lifecycle owns those.
    pub fn detach(&mut self, connection_id: ConnectionId) -> bool {
        self.connections.remove(&connection_id).is_some()
    }

    pub fn is_live(&self, connection_id: ConnectionId) -> bool {
        self.connections
            .get(&connection_id)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Every attached connection whose handler is still receiving.
    pub fn live_connections(&self) -> HashSet<ConnectionId> {
        self.connections
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Drops senders whose receiver is gone. Returns how many.
    pub fn prune_closed(&mut self) -> usize {
        let before = self.connections.len();
        self.connections.retain(|_, tx| !tx.is_closed());
        before - self.connections.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Delivers a reliable message to one connection. Returns `false` if
    /// the connection is unknown or gone.
    pub fn send_to_connection(&self, connection_id: ConnectionId, payload: impl Into<Payload>) -> bool {
        self.send_on(connection_id, payload.into(), Channel::ReliableOrdered)
    }

    /// Delivers to the active connection of `player`.
    pub fn send_to_player(
        &self,
        registry: &ConnectionRegistry,
        player: &PlayerId,
        payload: impl Into<Payload>,
    ) -> bool {
        registry
            .resolve_active_connection(player)
            .is_some_and(|conn| self.send_to_connection(conn, payload))
    }

    /// Delivers to every member of a session group. Returns how many
    /// connections accepted the message.
    pub fn send_to_session(&self, session_id: SessionId, payload: impl Into<Payload>) -> usize {
        let Some(group) = self.groups.get(&session_id) else {
            trace!(%session_id, "send to missing group");
            return 0;
        };
        let payload = payload.into();
        group
            .connections()
            .filter(|conn| self.send_on(*conn, payload.clone(), Channel::ReliableOrdered))
            .count()
    }

    /// Best-effort fan-out to every attached connection except `except`.
    /// Sent on the unreliable channel; handlers may drop it.
    pub fn broadcast_volatile(&self, payload: impl Into<Payload>, except: Option<ConnectionId>) -> usize {
        let payload = payload.into();
        self.connections
            .keys()
            .filter(|conn| Some(**conn) != except)
            .filter(|conn| self.send_on(**conn, payload.clone(), Channel::Unreliable))
            .count()
    }

    /// Tells the client why, then asks its handler to close the
    /// transport. The connection is detached immediately.
    pub fn close(&mut self, connection_id: ConnectionId, reason: &str) -> bool {
        let Some(tx) = self.connections.remove(&connection_id) else {
            return false;
        };
        let _ = tx.send(Outbound::Message {
            payload: Payload::System(SystemMessage::Disconnect {
                reason: reason.to_owned(),
            }),
            channel: Channel::ReliableOrdered,
        });
        let _ = tx.send(Outbound::Close {
            reason: reason.to_owned(),
        });
        debug!(conn_id = %connection_id, reason, "connection close requested");
        true
    }

    /// Closes every attached connection. Returns how many.
    pub fn close_all(&mut self, reason: &str) -> usize {
        let ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        ids.into_iter().filter(|id| self.close(*id, reason)).count()
    }

    /// Creates (or replaces) the group for `session_id`.
    pub fn create_group(&mut self, session_id: SessionId, members: impl IntoIterator<Item = (PlayerId, ConnectionId)>) {
        let mut group = SessionGroup::default();
        for (player, conn) in members {
            group.bind(player, conn);
        }
        self.groups.insert(session_id, group);
    }

    pub fn group(&self, session_id: SessionId) -> Option<&SessionGroup> {
        self.groups.get(&session_id)
    }

    /// Points `player`'s slot in the group at a new connection.
    pub fn rebind(&mut self, session_id: SessionId, player: PlayerId, connection_id: ConnectionId) -> bool {
        match self.groups.get_mut(&session_id) {
            Some(group) => {
                group.bind(player, connection_id);
                true
            }
            None => false,
        }
    }

    pub fn remove_group(&mut self, session_id: SessionId) -> Option<SessionGroup> {
        self.groups.remove(&session_id)
    }

    fn send_on(&self, connection_id: ConnectionId, payload: Payload, channel: Channel) -> bool {
        match self.connections.get(&connection_id) {
            Some(tx) => tx.send(Outbound::Message { payload, channel }).is_ok(),
            None => false,
        }
    }
}
