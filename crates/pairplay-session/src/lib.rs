//! Identity and connection bookkeeping for Pairplay.
//!
//! This crate answers "who is on this connection?" and "where do I reach
//! this player?":
//!
//! 1. **Authentication**: turning a signed token into an [`Identity`]
//!    ([`Authenticator`], [`JwtAuthenticator`]).
//! 2. **Connection registry**: identity ↔ connection mapping with one
//!    active connection per identity ([`ConnectionRegistry`]).
//! 3. **Pending intents**: match requests made before the player's
//!    connection exists ([`PendingIntentTracker`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Match core (above)      ← resolves players to connections, reacts to closes
//!     ↕
//! Session layer (this crate)
//!     ↕
//! Protocol / Transport    ← Identity, PlayerId, ConnectionId
//! ```
//!
//! [`Identity`]: pairplay_protocol::Identity

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod pending;
mod registry;

pub use auth::{Authenticator, JwtAuthenticator};
pub use error::SessionError;
pub use pending::{PendingIntent, PendingIntentTracker};
pub use registry::{
    ClosedConnection, ConnectionPolicy, ConnectionRegistry, ReconciledConnection, Registration,
    RegistryConfig,
};
