//! Core protocol types for Pairplay's wire format.
//!
//! Every type in this module travels on the wire: it is serialized by the
//! server, sent over a WebSocket, and parsed by a browser client (or the
//! other way round). Field names and tags are part of the public contract,
//! so the tests at the bottom pin the exact JSON shapes.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Board, Outcome, Role};

/// Protocol version a client must announce in `Handshake`.
pub const PROTOCOL_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The account id of a player, taken from a verified session token.
///
/// Opaque to the server: it's whatever the credential issuer put in the
/// token's `id` (or `sub`) claim. Serializes as a plain JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlayerId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for PlayerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A verified player: account id plus the name shown to opponents.
///
/// Established once from a token and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: PlayerId,
    pub display_name: String,
}

impl Identity {
    pub fn new(id: impl Into<PlayerId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}

/// Identifies one game session. Random v4 UUID, serialized as its
/// hyphenated string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a fresh random id.
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Which identity sits in which seat of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seats {
    #[serde(rename = "X")]
    pub x: Identity,
    #[serde(rename = "O")]
    pub o: Identity,
}

impl Seats {
    /// The identity holding `role`.
    pub fn get(&self, role: Role) -> &Identity {
        match role {
            Role::X => &self.x,
            Role::O => &self.o,
        }
    }

    /// The role held by `player`, if they are seated.
    pub fn role_of(&self, player: &PlayerId) -> Option<Role> {
        if &self.x.id == player {
            Some(Role::X)
        } else if &self.o.id == player {
            Some(Role::O)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Channel: delivery guarantees
// ---------------------------------------------------------------------------

/// The delivery guarantee for a message.
///
/// WebSockets are always reliable and ordered, so the channel is a hint
/// to the connection: `Unreliable` messages go through
/// `send_unreliable` and may be dropped under pressure. Presence updates
/// are the only unreliable traffic today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub enum Channel {
    #[default]
    ReliableOrdered,
    ReliableUnordered,
    Unreliable,
}

// ---------------------------------------------------------------------------
// Status and reason enums
// ---------------------------------------------------------------------------

/// State reported in `QueuedStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Waiting,
    Error,
}

/// Why a session was torn down before reaching a terminal board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// A participant's last connection went away.
    Disconnect,
}

/// Machine-readable reason attached to every `SystemMessage::Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    AuthFailed,
    Validation,
    NotParticipant,
    SessionEnded,
    NotYourTurn,
    InvalidCell,
    SessionNotFound,
    Anonymous,
    VersionMismatch,
}

impl ReasonCode {
    /// HTTP-style status code sent alongside the reason.
    pub fn status(self) -> u16 {
        match self {
            Self::Validation | Self::InvalidCell => 400,
            Self::AuthFailed | Self::Anonymous => 401,
            Self::NotParticipant => 403,
            Self::SessionNotFound => 404,
            Self::SessionEnded | Self::NotYourTurn => 409,
            Self::VersionMismatch => 426,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthFailed => "auth_failed",
            Self::Validation => "validation",
            Self::NotParticipant => "not_participant",
            Self::SessionEnded => "session_ended",
            Self::NotYourTurn => "not_your_turn",
            Self::InvalidCell => "invalid_cell",
            Self::SessionNotFound => "session_not_found",
            Self::Anonymous => "anonymous",
            Self::VersionMismatch => "version_mismatch",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SystemMessage: connection plumbing
// ---------------------------------------------------------------------------

/// Messages that manage the connection itself: handshake, registration,
/// heartbeats, errors.
///
/// Internally tagged, so a heartbeat looks like
/// `{"type": "Heartbeat", "client_time": 123}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SystemMessage {
    /// Client → Server, first message on every connection. A missing or
    /// unverifiable `token` leaves the connection anonymous.
    Handshake {
        version: u32,
        #[serde(default)]
        token: Option<String>,
    },

    /// Server → Client. `player_id` and `display_name` are `null` for
    /// anonymous connections.
    HandshakeAck {
        player_id: Option<PlayerId>,
        display_name: Option<String>,
        server_time: u64,
    },

    /// Client → Server: bind this connection to the identity in `token`.
    /// Used by clients that connected anonymously and logged in later.
    Register { token: String },

    /// Server → Client: registration succeeded.
    Registered {
        player_id: PlayerId,
        display_name: String,
    },

    /// Either direction. The server sends one right before it force-closes
    /// a superseded or torn-down connection.
    Disconnect { reason: String },

    /// Client → Server keep-alive.
    Heartbeat { client_time: u64 },

    /// Server → Client, echoes `client_time` for RTT measurement.
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// Server → Client. Sent only to the connection whose request failed.
    Error {
        code: u16,
        reason_code: ReasonCode,
        message: String,
    },
}

impl SystemMessage {
    /// Builds an `Error` whose numeric code is derived from `reason`.
    pub fn error(reason: ReasonCode, message: impl Into<String>) -> Self {
        Self::Error {
            code: reason.status(),
            reason_code: reason,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// MatchMessage: matchmaking and gameplay
// ---------------------------------------------------------------------------

/// Matchmaking and gameplay traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MatchMessage {
    // -- Client → Server --
    /// Put me in the matchmaking queue.
    RequestMatch,

    /// Place my mark on `cell_index` (0..=8, row-major).
    Move {
        session_id: SessionId,
        cell_index: u32,
    },

    // -- Server → Client --
    /// Answer to `RequestMatch`.
    QueuedStatus { status: QueueStatus, message: String },

    /// Sent to both participants when a pair is formed.
    Matched {
        session_id: SessionId,
        roles: Seats,
        board: Board,
        starting_role: Role,
    },

    /// Private: tells one connection which seat it holds.
    RoleAssigned { session_id: SessionId, role: Role },

    SessionStarted { session_id: SessionId },

    MoveApplied {
        session_id: SessionId,
        cell_index: u32,
        role: Role,
        board: Board,
    },

    SessionEnded {
        session_id: SessionId,
        outcome: Outcome,
        board: Board,
    },

    /// Private: sent to the participant who is still connected.
    OpponentDisconnected {
        session_id: SessionId,
        opponent: PlayerId,
        message: String,
    },

    /// Sent to the session group when a session is torn down early.
    MatchTerminated {
        session_id: SessionId,
        player_id: PlayerId,
        reason: TerminationReason,
    },

    /// Best-effort presence broadcast.
    PresenceChanged {
        player_id: PlayerId,
        display_name: String,
        online: bool,
    },
}

// ---------------------------------------------------------------------------
// Payload & Envelope
// ---------------------------------------------------------------------------

/// The content of an envelope.
///
/// Adjacently tagged:
/// `{"type": "Match", "data": {"type": "RequestMatch"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    System(SystemMessage),
    Match(MatchMessage),
}

impl From<SystemMessage> for Payload {
    fn from(msg: SystemMessage) -> Self {
        Self::System(msg)
    }
}

impl From<MatchMessage> for Payload {
    fn from(msg: MatchMessage) -> Self {
        Self::Match(msg)
    }
}

/// The top-level message wrapper. Every frame on the wire is an Envelope.
///
/// ```text
/// ┌─────────────────────────────────┐
/// │ seq: 42                         │  ← per-sender counter
/// │ timestamp: 15000                │  ← ms since server start
/// │ channel: ReliableOrdered        │
/// │ ┌─────────────────────────────┐ │
/// │ │ payload: Match(MoveApplied) │ │
/// │ └─────────────────────────────┘ │
/// └─────────────────────────────────┘
/// ```
///
/// Clients may omit `seq`, `timestamp` and `channel`; they default to
/// `0`, `0` and `ReliableOrdered`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub seq: u64,

    #[serde(default)]
    pub timestamp: u64,

    #[serde(default)]
    pub channel: Channel,

    pub payload: Payload,
}

#[cfg(test)]
mod tests {
    //! JSON shape tests. A mismatch here means browser clients can't parse
    //! our messages.

    use super::*;

    fn alice() -> Identity {
        Identity::new("u-alice", "alice")
    }

    fn bob() -> Identity {
        Identity::new("u-bob", "bob")
    }

    #[test]
    fn test_player_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&PlayerId::from("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
    }

    #[test]
    fn test_session_id_serializes_as_hyphenated_uuid() {
        let id = SessionId::new_v4();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.to_string()));
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }

    #[test]
    fn test_session_id_new_v4_is_unique() {
        assert_ne!(SessionId::new_v4(), SessionId::new_v4());
    }

    #[test]
    fn test_channel_default_is_reliable_ordered() {
        assert_eq!(Channel::default(), Channel::ReliableOrdered);
        let json = serde_json::to_string(&Channel::Unreliable).unwrap();
        assert_eq!(json, "\"Unreliable\"");
    }

    #[test]
    fn test_seats_role_of_and_json_keys() {
        let seats = Seats { x: alice(), o: bob() };

        assert_eq!(seats.role_of(&alice().id), Some(Role::X));
        assert_eq!(seats.role_of(&bob().id), Some(Role::O));
        assert_eq!(seats.role_of(&PlayerId::from("carol")), None);
        assert_eq!(seats.get(Role::O), &bob());

        let json = serde_json::to_value(&seats).unwrap();
        assert_eq!(json["X"]["display_name"], "alice");
        assert_eq!(json["O"]["id"], "u-bob");
    }

    #[test]
    fn test_system_message_error_builder_sets_code_from_reason() {
        let msg = SystemMessage::error(ReasonCode::NotYourTurn, "wait");
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "Error");
        assert_eq!(json["code"], 409);
        assert_eq!(json["reason_code"], "not_your_turn");
        assert_eq!(json["message"], "wait");
    }

    #[test]
    fn test_reason_code_serde_matches_as_str() {
        for code in [
            ReasonCode::AuthFailed,
            ReasonCode::Validation,
            ReasonCode::NotParticipant,
            ReasonCode::SessionEnded,
            ReasonCode::NotYourTurn,
            ReasonCode::InvalidCell,
            ReasonCode::SessionNotFound,
            ReasonCode::Anonymous,
            ReasonCode::VersionMismatch,
        ] {
            let json = serde_json::to_value(code).unwrap();
            assert_eq!(json, code.as_str());
        }
    }

    #[test]
    fn test_handshake_token_may_be_omitted() {
        let msg: SystemMessage =
            serde_json::from_str(r#"{"type":"Handshake","version":1}"#).unwrap();
        assert_eq!(
            msg,
            SystemMessage::Handshake {
                version: 1,
                token: None
            }
        );
    }

    #[test]
    fn test_handshake_ack_anonymous_has_null_identity() {
        let msg = SystemMessage::HandshakeAck {
            player_id: None,
            display_name: None,
            server_time: 10,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json["player_id"].is_null());
        assert!(json["display_name"].is_null());
    }

    #[test]
    fn test_move_decodes_from_client_json() {
        let id = SessionId::new_v4();
        let raw = format!(
            r#"{{"type":"Match","data":{{"type":"Move","session_id":"{id}","cell_index":4}}}}"#
        );
        let payload: Payload = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            payload,
            Payload::Match(MatchMessage::Move {
                session_id: id,
                cell_index: 4
            })
        );
    }

    #[test]
    fn test_move_with_negative_cell_is_rejected() {
        let raw = r#"{"type":"Move","session_id":"00000000-0000-4000-8000-000000000000","cell_index":-1}"#;
        assert!(serde_json::from_str::<MatchMessage>(raw).is_err());
    }

    #[test]
    fn test_matched_json_format() {
        let msg = MatchMessage::Matched {
            session_id: SessionId::new_v4(),
            roles: Seats { x: alice(), o: bob() },
            board: Board::new(),
            starting_role: Role::X,
        };
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["type"], "Matched");
        assert_eq!(json["starting_role"], "X");
        assert_eq!(json["board"].as_array().map(Vec::len), Some(9));
        assert_eq!(json["roles"]["X"]["id"], "u-alice");
    }

    #[test]
    fn test_queued_status_json_format() {
        let msg = MatchMessage::QueuedStatus {
            status: QueueStatus::Waiting,
            message: "Already queued".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "QueuedStatus");
        assert_eq!(json["status"], "waiting");
    }

    #[test]
    fn test_match_terminated_reason_is_snake_case() {
        let msg = MatchMessage::MatchTerminated {
            session_id: SessionId::new_v4(),
            player_id: PlayerId::from("u-bob"),
            reason: TerminationReason::Disconnect,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["reason"], "disconnect");
    }

    #[test]
    fn test_payload_match_json_format() {
        let payload = Payload::from(MatchMessage::RequestMatch);
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["type"], "Match");
        assert_eq!(json["data"]["type"], "RequestMatch");
    }

    #[test]
    fn test_envelope_channel_defaults_when_missing() {
        let json = r#"{
            "seq": 1,
            "timestamp": 100,
            "payload": { "type": "System", "data": { "type": "Heartbeat", "client_time": 7 } }
        }"#;
        let envelope: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.channel, Channel::ReliableOrdered);
        assert_eq!(
            envelope.payload,
            Payload::System(SystemMessage::Heartbeat { client_time: 7 })
        );
    }

    #[test]
    fn test_envelope_unknown_payload_type_is_rejected() {
        let json = r#"{"payload": {"type": "Game", "data": [1, 2]}}"#;
        assert!(serde_json::from_str::<Envelope>(json).is_err());
    }
}
