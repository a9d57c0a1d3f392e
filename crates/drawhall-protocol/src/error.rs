//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding wire payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed input, missing fields, or a
    /// tag that names no known event.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The payload parsed but violates a protocol rule.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
