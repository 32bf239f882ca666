//! Error types for the session layer.

/// Errors raised while establishing who is on the other end of a
/// connection.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The token was malformed, badly signed, expired, or lacked the
    /// claims needed to build an identity.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// A token was required but none (or an empty one) was supplied.
    #[error("no session token supplied")]
    MissingToken,
}
