//! Matchmaking and game sessions for pairplay.
//!
//! Players who ask for a match wait in a FIFO queue; the two oldest live
//! players are paired into a tic-tac-toe session with roles assigned by a
//! fair coin flip. The session validates moves, detects wins and draws,
//! reports scores, and is torn down after a short grace period.
//!
//! # Key types
//!
//! - [`MatchmakingCore`]: the shared handle every connection handler uses
//! - [`GameSession`]: one match's board and turn state machine
//! - [`MatchmakingQueue`]: waiting players, re-resolved at pairing time
//! - [`Gateway`]: per-connection and per-session delivery
//! - [`ScoreReporter`]: where results go once a game ends

#![allow(async_fn_in_trait)]

mod config;
mod matchmaker;
mod error;
mod game;
mod gateway;
mod queue;
mod score;

pub use config::CoreConfig;
pub use matchmaker::{CoreStats, IntentOutcome, MatchmakingCore};
pub use error::{MatchError, MoveError};
pub use game::{GameSession, MoveOutcome, winning_role};
pub use gateway::{Gateway, Outbound, OutboundReceiver, OutboundSender, SessionGroup};
pub use queue::{EnqueueOutcome, MatchmakingQueue, PairingPass, QueueEntry};
pub use score::{
    Leaderboard, LeaderboardEntry, NoopScoreReporter, ScoreDelta, ScoreError, ScoreReporter,
    ScoreResult, ScoringConfig,
};
