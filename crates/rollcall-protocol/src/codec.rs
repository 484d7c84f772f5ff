//! Codec trait and the JSON implementation.
//!
//! Rollcall speaks WebSocket text frames, so a codec here maps Rust
//! values to and from `String` rather than raw bytes. Browser pages can
//! then read frames with a plain `JSON.parse`.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes messages into text frames and decodes them back.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task through the server state.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a frame.
    ///
    /// # Errors
    /// [`ProtocolError::Encode`] if the value can't be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Parses a frame into a value.
    ///
    /// # Errors
    /// [`ProtocolError::Decode`] if the frame is malformed or doesn't
    /// match `T`.
    fn decode<T: DeserializeOwned>(&self, frame: &str) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
///
/// ```rust
/// use rollcall_protocol::{ClientMessage, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let frame = codec.encode(&ClientMessage::Ping { client_time: 7 }).unwrap();
/// let back: ClientMessage = codec.decode(&frame).unwrap();
/// assert_eq!(back, ClientMessage::Ping { client_time: 7 });
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, frame: &str) -> Result<T, ProtocolError> {
        serde_json::from_str(frame).map_err(ProtocolError::Decode)
    }
}
