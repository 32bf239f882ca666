//! The connection registry: which identity owns which live connection.
//!
//! Players reconnect, open a second tab, or vanish without a close frame.
//! The registry keeps a two-way mapping between identities and connection
//! ids through all of that and decides which connection is *active*, the
//! one that game traffic for the identity goes to.
//!
//! ```text
//! register_connection ──→ [active] ──(newer connection)──→ superseded / demoted
//!                            │
//!                            ├──(close)──→ Promoted (another one remains)
//!                            └──(close)──→ IdentityGone (cascade in the core)
//! ```
//!
//! # Concurrency note
//!
//! Like the rest of the session layer, `ConnectionRegistry` is a plain
//! struct with `&mut self` mutators. The match core owns it inside its
//! single state lock, so every mutation is serialized.

use std::collections::HashMap;

use pairplay_protocol::{Identity, PlayerId};
use pairplay_transport::ConnectionId;
use tracing::{debug, info, warn};

use crate::{PendingIntent, PendingIntentTracker};

/// What happens to an identity's older connections when a new one
/// registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionPolicy {
    /// Only the newest connection survives. Older ones are purged and
    /// reported in [`Registration::superseded`] so the caller can close
    /// them.
    #[default]
    SingleActive,
    /// Older connections stay registered but only the newest is active.
    /// When the active one closes, the most recent survivor is promoted.
    KeepAll,
}

#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    pub policy: ConnectionPolicy,
}

/// Result of [`ConnectionRegistry::register_connection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub identity: Identity,
    pub connection_id: ConnectionId,
    /// Connections of the same identity that were purged under
    /// [`ConnectionPolicy::SingleActive`]. The caller must close them.
    pub superseded: Vec<ConnectionId>,
    /// Set when the connection was previously bound to a different
    /// identity; describes what that move did to the old identity.
    pub moved_from: Option<ClosedConnection>,
    /// The parked intent for this identity, already consumed. The caller
    /// executes it before handling anything else from the connection.
    pub flushed: Option<PendingIntent>,
}

/// What removing a connection did to its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClosedConnection {
    /// That was the identity's last connection; the identity is gone.
    IdentityGone { identity: Identity },
    /// Other connections remain. `active` is the (possibly unchanged)
    /// active connection; `was_active` tells whether the removed one had
    /// been active, i.e. whether the active connection changed.
    Promoted {
        identity: Identity,
        active: ConnectionId,
        was_active: bool,
    },
}

impl ClosedConnection {
    pub fn identity(&self) -> &Identity {
        match self {
            Self::IdentityGone { identity } | Self::Promoted { identity, .. } => identity,
        }
    }
}

/// One dead entry purged by [`ConnectionRegistry::reconcile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledConnection {
    pub connection_id: ConnectionId,
    pub outcome: ClosedConnection,
}

#[derive(Debug)]
struct IdentityEntry {
    identity: Identity,
    /// Insertion order is recency: the last element is the newest.
    connections: Vec<ConnectionId>,
    active: ConnectionId,
}

/// Two-way identity ↔ connection mapping with at most one active
/// connection per identity.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    by_identity: HashMap<PlayerId, IdentityEntry>,
    by_connection: HashMap<ConnectionId, Identity>,
    pending: PendingIntentTracker,
    config: RegistryConfig,
}

impl ConnectionRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Replaces the pending-intent tracker (to set a TTL, for example).
    pub fn with_pending_tracker(mut self, pending: PendingIntentTracker) -> Self {
        self.pending = pending;
        self
    }

    /// Binds `connection_id` to `identity` and makes it the active
    /// connection, then consumes any parked intent for the identity.
    ///
    /// Registering the same pair twice is harmless. Registering a known
    /// connection under a different identity moves it.
    pub fn register_connection(
        &mut self,
        identity: Identity,
        connection_id: ConnectionId,
    ) -> Registration {
        let mut moved_from = None;
        if let Some(previous) = self.by_connection.get(&connection_id).cloned() {
            if previous.id != identity.id {
                self.by_connection.remove(&connection_id);
                moved_from = self.detach(connection_id, &previous);
                info!(
                    conn_id = %connection_id,
                    from = %previous.id,
                    to = %identity.id,
                    "connection re-registered under a new identity"
                );
            }
        }

        self.by_connection.insert(connection_id, identity.clone());
        let entry = self
            .by_identity
            .entry(identity.id.clone())
            .or_insert_with(|| IdentityEntry {
                identity: identity.clone(),
                connections: Vec::new(),
                active: connection_id,
            });
        entry.identity = identity.clone();
        // Re-registering moves the connection to the back (most recent).
        entry.connections.retain(|c| *c != connection_id);
        entry.connections.push(connection_id);
        entry.active = connection_id;

        let mut superseded = Vec::new();
        if self.config.policy == ConnectionPolicy::SingleActive {
            superseded = entry
                .connections
                .drain(..)
                .filter(|c| *c != connection_id)
                .collect();
            entry.connections.push(connection_id);
            for old in &superseded {
                self.by_connection.remove(old);
            }
        }

        let flushed = self.pending.take(&identity.id);

        info!(
            player_id = %identity.id,
            conn_id = %connection_id,
            superseded = superseded.len(),
            flushed = flushed.is_some(),
            "connection registered"
        );

        Registration {
            identity,
            connection_id,
            superseded,
            moved_from,
            flushed,
        }
    }

    /// The active connection for `player`, if any.
    pub fn resolve_active_connection(&self, player: &PlayerId) -> Option<ConnectionId> {
        self.by_identity.get(player).map(|entry| entry.active)
    }

    pub fn identity_of(&self, connection_id: ConnectionId) -> Option<&Identity> {
        self.by_connection.get(&connection_id)
    }

    /// Every registered connection of `player`, oldest first.
    pub fn connections_of(&self, player: &PlayerId) -> &[ConnectionId] {
        self.by_identity
            .get(player)
            .map_or(&[], |entry| entry.connections.as_slice())
    }

    pub fn is_active(&self, connection_id: ConnectionId) -> bool {
        self.by_connection
            .get(&connection_id)
            .and_then(|identity| self.by_identity.get(&identity.id))
            .is_some_and(|entry| entry.active == connection_id)
    }

    /// Removes a closed connection. `None` if it was unknown or already
    /// purged.
    pub fn on_connection_closed(&mut self, connection_id: ConnectionId) -> Option<ClosedConnection> {
        let identity = self.by_connection.remove(&connection_id)?;
        let closed = self.detach(connection_id, &identity);
        debug!(conn_id = %connection_id, player_id = %identity.id, ?closed, "connection closed");
        closed
    }

    /// Removes every trace of `player`, including a parked intent.
    /// Returns the connections that were registered for it.
    pub fn purge_identity(&mut self, player: &PlayerId) -> Vec<ConnectionId> {
        self.pending.cancel(player);
        let mut removed = self
            .by_identity
            .remove(player)
            .map(|entry| entry.connections)
            .unwrap_or_default();
        self.by_connection.retain(|conn, identity| {
            if &identity.id == player {
                if !removed.contains(conn) {
                    removed.push(*conn);
                }
                false
            } else {
                true
            }
        });
        if !removed.is_empty() {
            info!(player_id = %player, connections = removed.len(), "identity purged");
        }
        removed
    }

    /// Purges every connection for which `is_live` returns `false`, plus
    /// any list entry that lost its reverse mapping. Idempotent.
    pub fn reconcile(&mut self, is_live: impl Fn(ConnectionId) -> bool) -> Vec<ReconciledConnection> {
        let mut dead: Vec<(ConnectionId, Identity)> = self
            .by_connection
            .iter()
            .filter(|(conn, _)| !is_live(**conn))
            .map(|(conn, identity)| (*conn, identity.clone()))
            .collect();

        // Entries in an identity's list with no reverse mapping can't be
        // reached by close events any more.
        for entry in self.by_identity.values() {
            for conn in &entry.connections {
                if !self.by_connection.contains_key(conn) {
                    warn!(conn_id = %conn, player_id = %entry.identity.id, "orphaned connection entry");
                    dead.push((*conn, entry.identity.clone()));
                }
            }
        }
        dead.sort_by_key(|(conn, _)| *conn);
        dead.dedup_by_key(|(conn, _)| *conn);

        let mut reconciled = Vec::new();
        for (conn, identity) in dead {
            self.by_connection.remove(&conn);
            if let Some(outcome) = self.detach(conn, &identity) {
                reconciled.push(ReconciledConnection {
                    connection_id: conn,
                    outcome,
                });
            }
        }
        if !reconciled.is_empty() {
            info!(purged = reconciled.len(), "reconciled stale connections");
        }
        reconciled
    }

    pub fn pending(&self) -> &PendingIntentTracker {
        &self.pending
    }

    pub fn pending_mut(&mut self) -> &mut PendingIntentTracker {
        &mut self.pending
    }

    /// Number of identities with at least one connection.
    pub fn identity_count(&self) -> usize {
        self.by_identity.len()
    }

    pub fn connection_count(&self) -> usize {
        self.by_connection.len()
    }

    /// Removes `connection_id` from `identity`'s list and fixes up the
    /// active connection. The reverse mapping must already be gone.
    fn detach(&mut self, connection_id: ConnectionId, identity: &Identity) -> Option<ClosedConnection> {
        let entry = self.by_identity.get_mut(&identity.id)?;
        let before = entry.connections.len();
        entry.connections.retain(|c| *c != connection_id);
        if entry.connections.len() == before {
            return None;
        }

        match entry.connections.last().copied() {
            None => {
                let entry = self.by_identity.remove(&identity.id)?;
                Some(ClosedConnection::IdentityGone {
                    identity: entry.identity,
                })
            }
            Some(newest) => {
                let was_active = entry.active == connection_id;
                if was_active {
                    entry.active = newest;
                    info!(player_id = %identity.id, conn_id = %newest, "connection promoted to active");
                }
                Some(ClosedConnection::Promoted {
                    identity: entry.identity.clone(),
                    active: entry.active,
                    was_active,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for `ConnectionRegistry`, named
    //! `test_{function}_{scenario}_{expected}`.

    use super::*;

    fn alice() -> Identity {
        Identity::new("u-alice", "alice")
    }

    fn bob() -> Identity {
        Identity::new("u-bob", "bob")
    }

    fn conn(id: u64) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn single() -> ConnectionRegistry {
        ConnectionRegistry::new(RegistryConfig::default())
    }

    fn keep_all() -> ConnectionRegistry {
        ConnectionRegistry::new(RegistryConfig {
            policy: ConnectionPolicy::KeepAll,
        })
    }

    // =====================================================================
    // register_connection()
    // =====================================================================

    #[test]
    fn test_register_new_identity_becomes_active() {
        let mut reg = single();

        let r = reg.register_connection(alice(), conn(1));

        assert!(r.superseded.is_empty());
        assert!(r.moved_from.is_none());
        assert_eq!(reg.resolve_active_connection(&alice().id), Some(conn(1)));
        assert_eq!(reg.identity_of(conn(1)), Some(&alice()));
        assert!(reg.is_active(conn(1)));
    }

    #[test]
    fn test_register_second_connection_single_active_supersedes_old() {
        let mut reg = single();
        reg.register_connection(alice(), conn(1));

        let r = reg.register_connection(alice(), conn(2));

        assert_eq!(r.superseded, vec![conn(1)]);
        assert_eq!(reg.resolve_active_connection(&alice().id), Some(conn(2)));
        assert_eq!(reg.identity_of(conn(1)), None, "superseded is purged");
        assert_eq!(reg.connections_of(&alice().id), &[conn(2)]);
        assert_eq!(reg.connection_count(), 1);
    }

    #[test]
    fn test_register_second_connection_keep_all_demotes_old() {
        let mut reg = keep_all();
        reg.register_connection(alice(), conn(1));

        let r = reg.register_connection(alice(), conn(2));

        assert!(r.superseded.is_empty());
        assert_eq!(reg.resolve_active_connection(&alice().id), Some(conn(2)));
        assert!(!reg.is_active(conn(1)));
        assert_eq!(reg.connections_of(&alice().id), &[conn(1), conn(2)]);
    }

    #[test]
    fn test_register_same_connection_twice_is_idempotent() {
        let mut reg = single();
        reg.register_connection(alice(), conn(1));

        let r = reg.register_connection(alice(), conn(1));

        assert!(r.superseded.is_empty());
        assert_eq!(reg.connections_of(&alice().id), &[conn(1)]);
        assert_eq!(reg.connection_count(), 1);
    }

    #[test]
    fn test_register_connection_under_new_identity_moves_it() {
        let mut reg = single();
        reg.register_connection(alice(), conn(1));

        let r = reg.register_connection(bob(), conn(1));

        assert_eq!(
            r.moved_from,
            Some(ClosedConnection::IdentityGone { identity: alice() })
        );
        assert_eq!(reg.resolve_active_connection(&alice().id), None);
        assert_eq!(reg.resolve_active_connection(&bob().id), Some(conn(1)));
    }

    #[test]
    fn test_register_flushes_pending_intent_once() {
        let mut reg = single();
        reg.pending_mut().request(&alice().id);

        let first = reg.register_connection(alice(), conn(1));
        let second = reg.register_connection(alice(), conn(2));

        assert_eq!(first.flushed, Some(PendingIntent::EnqueueForMatch));
        assert_eq!(second.flushed, None);
        assert!(reg.pending().is_empty());
    }

    // =====================================================================
    // on_connection_closed()
    // =====================================================================

    #[test]
    fn test_close_last_connection_reports_identity_gone() {
        let mut reg = single();
        reg.register_connection(alice(), conn(1));

        let closed = reg.on_connection_closed(conn(1));

        assert_eq!(closed, Some(ClosedConnection::IdentityGone { identity: alice() }));
        assert_eq!(reg.identity_count(), 0);
        assert_eq!(reg.connection_count(), 0);
    }

    #[test]
    fn test_close_unknown_connection_returns_none() {
        let mut reg = single();
        assert_eq!(reg.on_connection_closed(conn(99)), None);
    }

    #[test]
    fn test_close_superseded_connection_is_noop() {
        // The close event for a superseded connection arrives after it was
        // purged; it must not remove the new active connection.
        let mut reg = single();
        reg.register_connection(alice(), conn(1));
        reg.register_connection(alice(), conn(2));

        assert_eq!(reg.on_connection_closed(conn(1)), None);
        assert_eq!(reg.resolve_active_connection(&alice().id), Some(conn(2)));
    }

    #[test]
    fn test_close_active_keep_all_promotes_most_recent() {
        let mut reg = keep_all();
        reg.register_connection(alice(), conn(1));
        reg.register_connection(alice(), conn(2));
        reg.register_connection(alice(), conn(3));

        let closed = reg.on_connection_closed(conn(3));

        assert_eq!(
            closed,
            Some(ClosedConnection::Promoted {
                identity: alice(),
                active: conn(2),
                was_active: true,
            })
        );
        assert_eq!(reg.resolve_active_connection(&alice().id), Some(conn(2)));
    }

    #[test]
    fn test_close_inactive_keep_all_leaves_active_unchanged() {
        let mut reg = keep_all();
        reg.register_connection(alice(), conn(1));
        reg.register_connection(alice(), conn(2));

        let closed = reg.on_connection_closed(conn(1));

        assert_eq!(
            closed,
            Some(ClosedConnection::Promoted {
                identity: alice(),
                active: conn(2),
                was_active: false,
            })
        );
    }

    #[test]
    fn test_register_and_close_sequence_keeps_at_most_one_active() {
        let mut reg = keep_all();
        let ops: &[(bool, u64)] = &[
            (true, 1),
            (true, 2),
            (false, 2),
            (true, 3),
            (true, 4),
            (false, 1),
            (false, 4),
            (true, 5),
            (false, 3),
        ];
        for &(register, id) in ops {
            if register {
                reg.register_connection(alice(), conn(id));
            } else {
                reg.on_connection_closed(conn(id));
            }
            let actives = reg
                .connections_of(&alice().id)
                .iter()
                .filter(|c| reg.is_active(**c))
                .count();
            assert!(actives <= 1, "more than one active connection");
            if !reg.connections_of(&alice().id).is_empty() {
                assert_eq!(actives, 1);
            }
        }
        assert_eq!(reg.resolve_active_connection(&alice().id), Some(conn(5)));
    }

    // =====================================================================
    // purge_identity()
    // =====================================================================

    #[test]
    fn test_purge_identity_removes_everything() {
        let mut reg = keep_all();
        reg.register_connection(alice(), conn(1));
        reg.register_connection(alice(), conn(2));
        reg.register_connection(bob(), conn(3));
        reg.pending_mut().request(&alice().id);

        let mut removed = reg.purge_identity(&alice().id);
        removed.sort();

        assert_eq!(removed, vec![conn(1), conn(2)]);
        assert_eq!(reg.identity_of(conn(1)), None);
        assert_eq!(reg.resolve_active_connection(&alice().id), None);
        assert!(!reg.pending().contains(&alice().id));
        assert_eq!(reg.resolve_active_connection(&bob().id), Some(conn(3)));
    }

    #[test]
    fn test_purge_unknown_identity_returns_empty() {
        let mut reg = single();
        assert!(reg.purge_identity(&alice().id).is_empty());
    }

    // =====================================================================
    // reconcile()
    // =====================================================================

    #[test]
    fn test_reconcile_purges_dead_connections() {
        let mut reg = single();
        reg.register_connection(alice(), conn(1));
        reg.register_connection(bob(), conn(2));

        let reconciled = reg.reconcile(|c| c == conn(2));

        assert_eq!(
            reconciled,
            vec![ReconciledConnection {
                connection_id: conn(1),
                outcome: ClosedConnection::IdentityGone { identity: alice() },
            }]
        );
        assert_eq!(reg.resolve_active_connection(&bob().id), Some(conn(2)));
    }

    #[test]
    fn test_reconcile_twice_is_idempotent() {
        let mut reg = keep_all();
        reg.register_connection(alice(), conn(1));
        reg.register_connection(alice(), conn(2));

        let first = reg.reconcile(|c| c == conn(1));
        let second = reg.reconcile(|c| c == conn(1));

        assert_eq!(first.len(), 1);
        assert!(matches!(
            first[0].outcome,
            ClosedConnection::Promoted { active, was_active: true, .. } if active == conn(1)
        ));
        assert!(second.is_empty());
    }

    #[test]
    fn test_reconcile_all_live_changes_nothing() {
        let mut reg = single();
        reg.register_connection(alice(), conn(1));

        assert!(reg.reconcile(|_| true).is_empty());
        assert_eq!(reg.connection_count(), 1);
    }
}
