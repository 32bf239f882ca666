//! Wire protocol for Pairplay.
//!
//! This crate defines the messages that clients and the server exchange:
//!
//! - **Types** ([`Envelope`], [`SystemMessage`], [`MatchMessage`],
//!   [`Identity`], [`SessionId`]): the structures on the wire.
//! - **Board** ([`Board`], [`Role`], [`SessionStatus`], [`Outcome`]): the
//!   tic-tac-toe state carried inside match messages.
//! - **Codec** ([`Codec`], [`JsonCodec`]): bytes ↔ envelopes.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Session (identity) → Match (core)
//! ```
//!
//! The protocol layer knows nothing about connections or queues; it only
//! knows how messages look.

mod board;
mod codec;
mod error;
mod types;

pub use board::{Board, CELL_COUNT, Outcome, Role, SessionStatus};
pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    Channel, Envelope, Identity, MatchMessage, PROTOCOL_VERSION, Payload,
    PlayerId, QueueStatus, ReasonCode, Seats, SessionId, SystemMessage,
    TerminationReason,
};
