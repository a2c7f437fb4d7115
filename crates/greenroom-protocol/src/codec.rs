//! Codec trait for turning commands and answers into storable bytes.
//!
//! The wire encoding lives in the socket layer. This codec exists for the
//! side channels that need *some* byte representation of a command or
//! answer, chiefly the audit trail, which stores one JSON document per
//! request/answer for offline replay.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values to bytes and decodes them back.
///
/// `Send + Sync + 'static` because a codec is owned by long-lived shared
/// state and used from many handler tasks at once.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or do not
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// The compact form is the default. [`JsonCodec::pretty`] produces
/// indented output, which is what the audit trail writes so the files can
/// be read by eye.
///
/// ```rust
/// use greenroom_protocol::{Answer, Codec, JsonCodec};
///
/// let codec = JsonCodec::default();
/// let answer = Answer::new().with("TID", 1);
/// let bytes = codec.encode(&answer).unwrap();
/// let back: Answer = codec.decode(&bytes).unwrap();
/// assert_eq!(answer, back);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    pretty: bool,
}

#[cfg(feature = "json")]
impl JsonCodec {
    /// A codec that indents its output.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        if self.pretty {
            serde_json::to_vec_pretty(value).map_err(ProtocolError::Encode)
        } else {
            serde_json::to_vec(value).map_err(ProtocolError::Encode)
        }
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
