//! Error types for the match layer.

use pairplay_protocol::{ReasonCode, SessionId};

/// Why a move was rejected. A rejected move never changes the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    #[error("you are not a player in this session")]
    NotParticipant,

    #[error("the session has already ended")]
    SessionEnded,

    #[error("not your turn")]
    NotYourTurn,

    /// Off the board or already occupied.
    #[error("cell {0} is not available")]
    InvalidCell(u32),
}

impl MoveError {
    pub fn reason_code(self) -> ReasonCode {
        match self {
            Self::NotParticipant => ReasonCode::NotParticipant,
            Self::SessionEnded => ReasonCode::SessionEnded,
            Self::NotYourTurn => ReasonCode::NotYourTurn,
            Self::InvalidCell(_) => ReasonCode::InvalidCell,
        }
    }
}

/// Errors returned by [`MatchmakingCore`](crate::MatchmakingCore)
/// operations. Each maps to a `reason_code` sent only to the offending
/// connection.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    /// The connection has no verified identity.
    #[error("authentication required")]
    Anonymous,

    /// The identity is still bound to a session, ongoing or awaiting
    /// teardown.
    #[error("already in session {0}")]
    AlreadyInSession(SessionId),

    #[error(transparent)]
    Move(#[from] MoveError),
}

impl MatchError {
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            Self::SessionNotFound(_) => ReasonCode::SessionNotFound,
            Self::Anonymous => ReasonCode::Anonymous,
            Self::AlreadyInSession(_) => ReasonCode::Validation,
            Self::Move(e) => e.reason_code(),
        }
    }
}
