//! Actions requested for an identity that has no live connection yet.
//!
//! An out-of-band caller (an HTTP "quick match" endpoint, say) may ask to
//! queue a player before their WebSocket is up. The request is parked
//! here and replayed exactly once when the identity registers.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use pairplay_protocol::PlayerId;

/// An action waiting for its identity to connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingIntent {
    EnqueueForMatch,
}

#[derive(Debug)]
struct Entry {
    intent: PendingIntent,
    requested_at: Instant,
}

/// At most one pending intent per identity; each is consumed once.
#[derive(Debug, Default)]
pub struct PendingIntentTracker {
    intents: HashMap<PlayerId, Entry>,
    /// `None` keeps intents until taken or cancelled.
    ttl: Option<Duration>,
}

impl PendingIntentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intents older than `ttl` are treated as absent and dropped by
    /// [`expire_stale`](Self::expire_stale).
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            intents: HashMap::new(),
            ttl: Some(ttl),
        }
    }

    /// Parks `EnqueueForMatch` for `player`. Returns `false` if a live
    /// intent was already pending (the existing one is kept).
    pub fn request(&mut self, player: &PlayerId) -> bool {
        if self.contains(player) {
            return false;
        }
        self.intents.insert(
            player.clone(),
            Entry {
                intent: PendingIntent::EnqueueForMatch,
                requested_at: Instant::now(),
            },
        );
        tracing::debug!(player_id = %player, "match intent parked");
        true
    }

    /// Removes and returns the intent for `player`. An expired intent is
    /// removed but not returned.
    pub fn take(&mut self, player: &PlayerId) -> Option<PendingIntent> {
        let entry = self.intents.remove(player)?;
        if self.is_expired(&entry) {
            tracing::debug!(player_id = %player, "parked intent expired before connect");
            return None;
        }
        Some(entry.intent)
    }

    /// Drops any intent for `player`. Returns whether one was removed.
    pub fn cancel(&mut self, player: &PlayerId) -> bool {
        self.intents.remove(player).is_some()
    }

    pub fn contains(&self, player: &PlayerId) -> bool {
        self.intents
            .get(player)
            .is_some_and(|entry| !self.is_expired(entry))
    }

    /// Removes every expired intent and returns whose they were.
    pub fn expire_stale(&mut self) -> Vec<PlayerId> {
        let Some(ttl) = self.ttl else {
            return Vec::new();
        };
        let mut expired = Vec::new();
        self.intents.retain(|player, entry| {
            if entry.requested_at.elapsed() >= ttl {
                expired.push(player.clone());
                false
            } else {
                true
            }
        });
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "expired parked match intents");
        }
        expired
    }

    /// Number of stored intents, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    fn is_expired(&self, entry: &Entry) -> bool {
        self.ttl
            .is_some_and(|ttl| entry.requested_at.elapsed() >= ttl)
    }
}

#[cfg(test)]
mod tests {
    //! Time-dependent cases use a zero TTL (expires at once) or a one-hour
    //! TTL (never expires during the test) instead of sleeping.

    use super::*;

    fn pid(id: &str) -> PlayerId {
        PlayerId::from(id)
    }

    #[test]
    fn test_request_new_identity_returns_true() {
        let mut tracker = PendingIntentTracker::new();
        assert!(tracker.request(&pid("a")));
        assert!(tracker.contains(&pid("a")));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_request_twice_keeps_single_intent() {
        let mut tracker = PendingIntentTracker::new();
        assert!(tracker.request(&pid("a")));
        assert!(!tracker.request(&pid("a")));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_take_consumes_exactly_once() {
        let mut tracker = PendingIntentTracker::new();
        tracker.request(&pid("a"));

        assert_eq!(tracker.take(&pid("a")), Some(PendingIntent::EnqueueForMatch));
        assert_eq!(tracker.take(&pid("a")), None);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_cancel_removes_intent() {
        let mut tracker = PendingIntentTracker::new();
        tracker.request(&pid("a"));

        assert!(tracker.cancel(&pid("a")));
        assert!(!tracker.cancel(&pid("a")));
        assert_eq!(tracker.take(&pid("a")), None);
    }

    #[test]
    fn test_take_expired_intent_returns_none() {
        let mut tracker = PendingIntentTracker::with_ttl(Duration::ZERO);
        tracker.request(&pid("a"));

        assert!(!tracker.contains(&pid("a")));
        assert_eq!(tracker.take(&pid("a")), None);
        assert!(tracker.is_empty(), "expired entry is removed on take");
    }

    #[test]
    fn test_request_replaces_expired_intent() {
        let mut tracker = PendingIntentTracker::with_ttl(Duration::ZERO);
        tracker.request(&pid("a"));
        // The old entry is expired, so a new request is accepted.
        assert!(tracker.request(&pid("a")));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_expire_stale_drops_only_expired() {
        let mut tracker = PendingIntentTracker::with_ttl(Duration::ZERO);
        tracker.request(&pid("a"));
        tracker.request(&pid("b"));

        let mut expired = tracker.expire_stale();
        expired.sort();
        assert_eq!(expired, vec![pid("a"), pid("b")]);
        assert!(tracker.is_empty());

        let mut long = PendingIntentTracker::with_ttl(Duration::from_secs(3600));
        long.request(&pid("c"));
        assert!(long.expire_stale().is_empty());
        assert!(long.contains(&pid("c")));
    }

    #[test]
    fn test_expire_stale_without_ttl_is_noop() {
        let mut tracker = PendingIntentTracker::new();
        tracker.request(&pid("a"));
        assert!(tracker.expire_stale().is_empty());
        assert_eq!(tracker.len(), 1);
    }
}
