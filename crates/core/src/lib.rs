//! Wire-level building blocks for the call bridge.
//!
//! Everything in this crate is free of sockets and runtime state: the frame
//! codecs for both sides of a call, the configuration record sent to the
//! realtime endpoint, and the client that resolves tool calls over HTTP.

pub mod audio;
pub mod realtime;
pub mod session_config;
pub mod telephony;
pub mod tool;

/// Errors raised while decoding or encoding a single frame.
///
/// A `CodecError` never ends a session; the offending frame is dropped.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed JSON frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid base64 audio payload: {0}")]
    Base64(#[from] base64::DecodeError),
}
