//! Error types for the protocol layer.

/// Errors that can occur in the protocol layer.
///
/// Each crate in Tandem defines its own error enum, so a `ProtocolError`
/// always means the problem is in encoding, decoding, or validating a
/// value that crossed the wire.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, or an
    /// unknown `type` tag.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A client identifier that is empty, too long, or contains
    /// characters outside `[A-Za-z0-9_-]`.
    #[error("invalid client id: {0:?}")]
    InvalidClientId(String),

    /// The message decoded but violates protocol rules.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
