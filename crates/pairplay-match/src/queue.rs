//! The matchmaking queue.
//!
//! A FIFO of identities waiting for an opponent. Entries carry the
//! connection seen at enqueue time, but pairing never trusts it: every
//! entry is re-resolved against the registry when it reaches the front.

use std::collections::VecDeque;
use std::time::Instant;

use pairplay_protocol::{Identity, PlayerId};
use pairplay_transport::ConnectionId;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub identity: Identity,
    pub connection_id: ConnectionId,
    pub enqueued_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Newly added at `position` (0 = front).
    Queued { position: usize },
    /// Already waiting; nothing changed.
    AlreadyQueued { position: usize },
}

/// Result of one [`MatchmakingQueue::attempt_pairing`] pass.
#[derive(Debug, Default)]
pub struct PairingPass {
    /// Pairs in the order they were formed. Connection ids are the
    /// freshly resolved ones.
    pub pairs: Vec<(QueueEntry, QueueEntry)>,
    /// Entries dropped because their identity no longer had a live
    /// connection.
    pub dropped: Vec<QueueEntry>,
}

/// At most one entry per identity.
#[derive(Debug, Default)]
pub struct MatchmakingQueue {
    entries: VecDeque<QueueEntry>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `identity` at the back unless it is already queued. A repeat
    /// request refreshes the stored connection but keeps the position.
    pub fn enqueue(&mut self, identity: Identity, connection_id: ConnectionId) -> EnqueueOutcome {
        if let Some(position) = self.position(&identity.id) {
            self.entries[position].connection_id = connection_id;
            return EnqueueOutcome::AlreadyQueued { position };
        }
        debug!(player_id = %identity.id, conn_id = %connection_id, "enqueued");
        self.entries.push_back(QueueEntry {
            identity,
            connection_id,
            enqueued_at: Instant::now(),
        });
        EnqueueOutcome::Queued {
            position: self.entries.len() - 1,
        }
    }

    /// Returns whether an entry was removed.
    pub fn remove(&mut self, player: &PlayerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| &e.identity.id != player);
        before != self.entries.len()
    }

    pub fn contains(&self, player: &PlayerId) -> bool {
        self.position(player).is_some()
    }

    pub fn position(&self, player: &PlayerId) -> Option<usize> {
        self.entries.iter().position(|e| &e.identity.id == player)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pairs waiting identities, oldest first.
    ///
    /// While two or more entries remain, the two oldest are popped and
    /// each is re-resolved with `resolve`. Unresolvable entries are
    /// dropped for good. If only one resolves it goes back to the front
    /// and the scan continues with the next entry, so a live player keeps
    /// its priority and is never pushed to the back.
    pub fn attempt_pairing(
        &mut self,
        mut resolve: impl FnMut(&PlayerId) -> Option<ConnectionId>,
    ) -> PairingPass {
        let mut pass = PairingPass::default();

        // Every iteration removes at least one entry for good (a pair, or
        // a dropped entry), so the loop ends after at most `len` rounds.
        while self.entries.len() >= 2 {
            let (Some(a), Some(b)) = (self.entries.pop_front(), self.entries.pop_front()) else {
                break;
            };

            // The connection id stored at enqueue time may belong to a
            // socket that was superseded or died since. Look the player
            // up again instead of trusting it.
            let a = Self::refresh(a, &mut resolve, &mut pass.dropped);
            let b = Self::refresh(b, &mut resolve, &mut pass.dropped);

            match (a, b) {
                (Some(a), Some(b)) => pass.pairs.push((a, b)),
                // One side is gone. The survivor was the oldest (or second
                // oldest) waiter, so it goes back to the head of the line
                // and meets the next entry in the following round.
                (Some(survivor), None) | (None, Some(survivor)) => {
                    self.entries.push_front(survivor);
                }
                (None, None) => {}
            }
        }

        pass
    }

    fn refresh(
        mut entry: QueueEntry,
        resolve: &mut impl FnMut(&PlayerId) -> Option<ConnectionId>,
        dropped: &mut Vec<QueueEntry>,
    ) -> Option<QueueEntry> {
        match resolve(&entry.identity.id) {
            Some(conn) => {
                if conn != entry.connection_id {
                    debug!(
                        player_id = %entry.identity.id,
                        from = %entry.connection_id,
                        to = %conn,
                        "queue entry connection refreshed"
                    );
                    entry.connection_id = conn;
                }
                Some(entry)
            }
            None => {
                warn!(player_id = %entry.identity.id, "dropping queue entry with no live connection");
                dropped.push(entry);
                None
            }
        }
    }
}
