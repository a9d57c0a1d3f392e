//! Codec trait and implementations for putting events on the wire.
//!
//! The engine publishes typed [`RoomEvent`](crate::RoomEvent)s; whatever
//! transport fans them out to browsers picks a [`Codec`] to turn them into
//! bytes. [`JsonCodec`] is the only implementation today.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values to bytes and decodes them back.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
///
/// ```rust
/// use drawhall_protocol::{Codec, Event, JsonCodec, RoomEvent, RoomId};
///
/// let codec = JsonCodec;
/// let ev = RoomEvent {
///     room_id: RoomId(1),
///     event: Event::CountdownTick { seconds_remaining: 3 },
/// };
/// let bytes = codec.encode(&ev).unwrap();
/// let back: RoomEvent = codec.decode(&bytes).unwrap();
/// assert_eq!(ev, back);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
