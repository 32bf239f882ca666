//! # Pairplay
//!
//! Real-time matchmaking and session coordination for two-player
//! tic-tac-toe over WebSockets.
//!
//! Clients connect, hand over a signed session token, and ask for a
//! match. The server pairs waiting players, runs each game
//! authoritatively, reports results to a score store, and cleans up
//! after disconnects and finished games.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pairplay::prelude::*;
//!
//! # async fn run() -> Result<(), PairplayError> {
//! let server = PairplayServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .build(JwtAuthenticator::new(b"secret"), Leaderboard::new())
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::PairplayError;
pub use server::{PairplayServer, PairplayServerBuilder, ShutdownHandle};

/// Re-exports of the commonly used types across all crates.
pub mod prelude {
    pub use crate::{PairplayError, PairplayServer, PairplayServerBuilder, ShutdownHandle};

    pub use pairplay_match::{
        CoreConfig, CoreStats, IntentOutcome, Leaderboard, LeaderboardEntry, MatchError,
        MatchmakingCore, MoveError, NoopScoreReporter, ScoreDelta, ScoreError, ScoreReporter,
        ScoreResult, ScoringConfig,
    };
    pub use pairplay_protocol::{
        Board, Channel, Envelope, Identity, MatchMessage, Outcome, PROTOCOL_VERSION, Payload,
        PlayerId, QueueStatus, ReasonCode, Role, Seats, SessionId, SessionStatus, SystemMessage,
        TerminationReason,
    };
    pub use pairplay_sched::SweepConfig;
    pub use pairplay_session::{
        Authenticator, ConnectionPolicy, JwtAuthenticator, RegistryConfig, SessionError,
    };
}
