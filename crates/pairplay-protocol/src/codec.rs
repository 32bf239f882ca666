//! Codec trait and implementations for serializing/deserializing messages.
//!
//! The server never calls `serde_json` directly: it holds a [`Codec`] and
//! asks it to turn envelopes into bytes and back. [`JsonCodec`] is the
//! only implementation today; browser clients speak JSON over text
//! frames.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value can't be represented
    /// in this format.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ```rust
/// use pairplay_protocol::{
///     Channel, Codec, Envelope, JsonCodec, MatchMessage, Payload,
/// };
///
/// let codec = JsonCodec;
/// let envelope = Envelope {
///     seq: 1,
///     timestamp: 5000,
///     channel: Channel::ReliableOrdered,
///     payload: Payload::Match(MatchMessage::RequestMatch),
/// };
///
/// let bytes = codec.encode(&envelope).unwrap();
/// let decoded: Envelope = codec.decode(&bytes).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        // Always valid UTF-8, which is what lets the WebSocket transport
        // send the result as a text frame that browsers can read directly.
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        // Text and binary frames both arrive here as bytes. A frame that
        // parses as JSON but doesn't fit `T` (unknown `type` tag, missing
        // field) is a decode error too; the handler answers either case
        // with a `validation` error and keeps the connection open.
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{Envelope, Payload, SystemMessage};

    #[test]
    fn test_decode_client_envelope_without_seq_or_timestamp() {
        // Browser clients often omit bookkeeping fields.
        let raw = br#"{"payload":{"type":"System","data":{"type":"Register","token":"abc"}}}"#;
        let env: Envelope = JsonCodec.decode(raw).expect("should decode");
        assert_eq!(env.seq, 0);
        assert_eq!(
            env.payload,
            Payload::System(SystemMessage::Register { token: "abc".into() })
        );
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let result: Result<Envelope, _> = JsonCodec.decode(b"not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
