use crate::CodecError;
use base64::{
    Engine,
    alphabet,
    engine::{GeneralPurpose, GeneralPurposeConfig, general_purpose},
};
use bytes::Bytes;

/// Standard alphabet, tolerant of non-zero trailing bits the way telephony
/// and realtime peers emit them.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// A chunk of encoded call audio, stripped of its transport envelope.
///
/// The chunk keeps the decoded bytes together with the exact base64 text it
/// arrived as, so forwarding a chunk to the other side never alters the
/// payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioChunk {
    bytes: Bytes,
    encoded: String,
}

impl AudioChunk {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let encoded = general_purpose::STANDARD.encode(&bytes);
        Self { bytes, encoded }
    }

    /// Decodes a base64 payload, keeping the original text for re-encoding.
    pub fn from_base64(payload: impl Into<String>) -> Result<Self, CodecError> {
        let encoded = payload.into();
        let bytes = LENIENT.decode(&encoded)?;
        Ok(Self {
            bytes: Bytes::from(bytes),
            encoded,
        })
    }

    /// The raw audio, as decoded from the payload.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn to_base64(&self) -> &str {
        &self.encoded
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
