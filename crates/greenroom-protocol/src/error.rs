//! Error types for the protocol layer.

/// Errors raised while interpreting decoded commands or serializing
/// records built from them.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (used by the audit trail).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A field was present but could not be interpreted, e.g. a `GID`
    /// that is not a number.
    #[error("invalid field {field}: {value:?}")]
    InvalidField {
        /// Field name as it appears in the command.
        field: &'static str,
        /// The raw value that failed to parse.
        value: String,
    },

    /// The message is structurally valid but breaks a protocol rule.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
