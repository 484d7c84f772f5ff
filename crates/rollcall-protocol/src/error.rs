//! Error types for the protocol layer.
//!
//! Each crate in Rollcall defines its own error enum. A `ProtocolError`
//! always means "the bytes or text were wrong", never "the session was
//! wrong": session validity is decided one layer up.

/// Errors that can occur while encoding or decoding protocol data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing a message or payload to JSON failed.
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// A frame did not parse as the expected message type.
    ///
    /// Common causes: malformed JSON, an unknown `"type"` tag, or a
    /// missing required field.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// Scanned text could not be turned into a session identifier.
    #[error("invalid scan payload: {0}")]
    InvalidPayload(String),

    /// The payload doesn't fit in a QR code.
    #[error("qr render failed: {0}")]
    Render(String),
}
