//! Score reporting boundary.
//!
//! When a session reaches a terminal board the core reports one
//! [`ScoreDelta`] per participant through a [`ScoreReporter`]. Reports are
//! fire-and-forget: they run detached on the scheduler, and a failure is
//! logged and dropped.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use pairplay_protocol::{Identity, PlayerId};
use tokio::sync::Mutex;

/// How a participant finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreResult {
    Win,
    Loss,
    Draw,
}

/// The increment to apply to one player's record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreDelta {
    pub result: ScoreResult,
    pub points: u32,
}

/// Points awarded per result.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub win_points: u32,
    pub loss_points: u32,
    pub draw_points: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            win_points: 10,
            loss_points: 0,
            draw_points: 5,
        }
    }
}

impl ScoringConfig {
    pub fn delta(&self, result: ScoreResult) -> ScoreDelta {
        let points = match result {
            ScoreResult::Win => self.win_points,
            ScoreResult::Loss => self.loss_points,
            ScoreResult::Draw => self.draw_points,
        };
        ScoreDelta { result, points }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    /// The backing store could not be reached.
    #[error("score store unavailable: {0}")]
    Unavailable(String),

    #[error("score update rejected: {0}")]
    Rejected(String),
}

/// Records results in an external leaderboard/account store.
///
/// Implementations upsert: the first delta for an unknown identity
/// creates its record.
pub trait ScoreReporter: Send + Sync + 'static {
    fn record_outcome(
        &self,
        identity: Identity,
        delta: ScoreDelta,
    ) -> impl Future<Output = Result<(), ScoreError>> + Send;
}

impl<T: ScoreReporter> ScoreReporter for Arc<T> {
    fn record_outcome(
        &self,
        identity: Identity,
        delta: ScoreDelta,
    ) -> impl Future<Output = Result<(), ScoreError>> + Send {
        (**self).record_outcome(identity, delta)
    }
}

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScoreReporter;

impl ScoreReporter for NoopScoreReporter {
    async fn record_outcome(&self, _identity: Identity, _delta: ScoreDelta) -> Result<(), ScoreError> {
        Ok(())
    }
}

/// One player's accumulated record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub player_id: PlayerId,
    pub display_name: String,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    pub total_points: u32,
}

/// In-memory leaderboard. Useful for tests and single-node demos.
#[derive(Debug, Default)]
pub struct Leaderboard {
    entries: Mutex<HashMap<PlayerId, LeaderboardEntry>>,
}

impl Leaderboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, player: &PlayerId) -> Option<LeaderboardEntry> {
        self.entries.lock().await.get(player).cloned()
    }

    /// The `n` best records, most wins first, ties broken by points.
    pub async fn top(&self, n: usize) -> Vec<LeaderboardEntry> {
        let entries = self.entries.lock().await;
        let mut all: Vec<LeaderboardEntry> = entries.values().cloned().collect();
        all.sort_by(|a, b| {
            b.wins
                .cmp(&a.wins)
                .then(b.total_points.cmp(&a.total_points))
                .then_with(|| a.player_id.cmp(&b.player_id))
        });
        all.truncate(n);
        all
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

impl ScoreReporter for Leaderboard {
    async fn record_outcome(&self, identity: Identity, delta: ScoreDelta) -> Result<(), ScoreError> {
        let mut entries = self.entries.lock().await;
        let entry = entries
            .entry(identity.id.clone())
            .or_insert_with(|| LeaderboardEntry {
                player_id: identity.id.clone(),
                display_name: identity.display_name.clone(),
                wins: 0,
                losses: 0,
                draws: 0,
                total_points: 0,
            });
        entry.display_name = identity.display_name;
        match delta.result {
            ScoreResult::Win => entry.wins += 1,
            ScoreResult::Loss => entry.losses += 1,
            ScoreResult::Draw => entry.draws += 1,
        }
        entry.total_points += delta.points;
        Ok(())
    }
}
