//! Unified error type for the Pairplay server.

use pairplay_match::MatchError;
use pairplay_protocol::ProtocolError;
use pairplay_session::SessionError;
use pairplay_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum PairplayError {
    /// Connection, send, receive or accept failures.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encode, decode or invalid message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Authentication and registration.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Matchmaking and moves.
    #[error(transparent)]
    Match(#[from] MatchError),
}

#[cfg(test)]
mod tests {
    use pairplay_match::MoveError;

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let pairplay_err: PairplayError = err.into();
        assert!(matches!(pairplay_err, PairplayError::Transport(_)));
        assert!(pairplay_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let pairplay_err: PairplayError = err.into();
        assert!(matches!(pairplay_err, PairplayError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let pairplay_err: PairplayError = SessionError::MissingToken.into();
        assert!(matches!(pairplay_err, PairplayError::Session(_)));
    }

    #[test]
    fn test_from_match_error_keeps_message() {
        let err = MatchError::from(MoveError::NotYourTurn);
        let pairplay_err: PairplayError = err.into();
        assert!(matches!(pairplay_err, PairplayError::Match(_)));
        assert_eq!(pairplay_err.to_string(), "not your turn");
    }
}
