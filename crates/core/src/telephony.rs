//! Media-stream envelope spoken by the telephony platform.
//!
//! Inbound frames are JSON text tagged by an `event` field; the bridge only
//! acts on `start`, `media` and `stop`. Outbound frames are `media` (audio for
//! playback) and `clear` (drop whatever is queued for playback).

use crate::{CodecError, audio::AudioChunk};
use serde::{Deserialize, Serialize};

/// A decoded inbound telephony frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelephonyFrame {
    /// Caller audio to forward upstream.
    InboundAudio { chunk: AudioChunk },
    /// The platform opened the media stream and assigned it a `streamSid`.
    StreamStarted {
        stream_sid: String,
        call_sid: Option<String>,
    },
    /// The platform ended the media stream.
    StreamStopped,
    /// Any other event (`connected`, `mark`, `dtmf`, ...).
    Unknown { event: String },
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    start: Option<RawStart>,
    media: Option<MediaPayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStart {
    stream_sid: Option<String>,
    call_sid: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct MediaPayload {
    payload: String,
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum OutboundFrame<'a> {
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: &'a str,
        media: MediaPayload,
    },
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: &'a str,
    },
}

/// Decodes one inbound text frame.
///
/// Fails when the frame is not JSON, has no `event`, or is a `start`/`media`
/// frame without the fields those events require.
pub fn decode_telephony_frame(raw: &str) -> Result<TelephonyFrame, CodecError> {
    let frame: RawFrame = serde_json::from_str(raw)?;
    match frame.event.as_str() {
        "media" => {
            let media = frame.media.ok_or(CodecError::MissingField("media.payload"))?;
            let chunk = AudioChunk::from_base64(media.payload)?;
            Ok(TelephonyFrame::InboundAudio { chunk })
        }
        "start" => {
            let start = frame.start.ok_or(CodecError::MissingField("start"))?;
            let stream_sid = start
                .stream_sid
                .ok_or(CodecError::MissingField("start.streamSid"))?;
            Ok(TelephonyFrame::StreamStarted {
                stream_sid,
                call_sid: start.call_sid,
            })
        }
        "stop" => Ok(TelephonyFrame::StreamStopped),
        _ => Ok(TelephonyFrame::Unknown { event: frame.event }),
    }
}

/// Encodes an outbound `media` frame for playback on `stream_sid`.
pub fn encode_media_frame(stream_sid: &str, chunk: &AudioChunk) -> Result<String, CodecError> {
    let frame = OutboundFrame::Media {
        stream_sid,
        media: MediaPayload {
            payload: chunk.to_base64().to_owned(),
        },
    };
    Ok(serde_json::to_string(&frame)?)
}

/// Encodes an outbound `clear` frame, flushing queued playback on `stream_sid`.
pub fn encode_clear_frame(stream_sid: &str) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&OutboundFrame::Clear { stream_sid })?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_decode_start_frame() {
        let raw = r#"{"event":"start","sequenceNumber":"1","start":{"streamSid":"SX1","callSid":"CA9","tracks":["inbound"]},"streamSid":"SX1"}"#;
        let frame = decode_telephony_frame(raw).unwrap();
        assert_eq!(
            frame,
            TelephonyFrame::StreamStarted {
                stream_sid: "SX1".to_string(),
                call_sid: Some("CA9".to_string()),
            }
        );
    }

    #[test]
    fn test_decode_media_frame() {
        let raw = r#"{"event":"media","streamSid":"SX1","media":{"track":"inbound","chunk":"2","timestamp":"5","payload":"AAA="}}"#;
        match decode_telephony_frame(raw).unwrap() {
            TelephonyFrame::InboundAudio { chunk } => {
                assert_eq!(chunk.to_base64(), "AAA=");
                assert_eq!(chunk.bytes().as_ref(), &[0u8, 0u8]);
            }
            other => panic!("expected InboundAudio, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_stop_and_unknown_frames() {
        assert_eq!(
            decode_telephony_frame(r#"{"event":"stop","streamSid":"SX1"}"#).unwrap(),
            TelephonyFrame::StreamStopped
        );
        assert_eq!(
            decode_telephony_frame(r#"{"event":"connected","protocol":"Call","version":"1.0.0"}"#)
                .unwrap(),
            TelephonyFrame::Unknown {
                event: "connected".to_string()
            }
        );
        assert_eq!(
            decode_telephony_frame(r#"{"event":"mark","mark":{"name":"greeting"}}"#).unwrap(),
            TelephonyFrame::Unknown {
                event: "mark".to_string()
            }
        );
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        assert!(matches!(
            decode_telephony_frame("not json"),
            Err(CodecError::Json(_))
        ));
        // `event` is mandatory
        assert!(matches!(
            decode_telephony_frame(r#"{"media":{"payload":"AAA="}}"#),
            Err(CodecError::Json(_))
        ));
        assert!(matches!(
            decode_telephony_frame(r#"{"event":"media"}"#),
            Err(CodecError::MissingField("media.payload"))
        ));
        assert!(matches!(
            decode_telephony_frame(r#"{"event":"start","start":{}}"#),
            Err(CodecError::MissingField("start.streamSid"))
        ));
        assert!(matches!(
            decode_telephony_frame(r#"{"event":"media","media":{"payload":"%%%"}}"#),
            Err(CodecError::Base64(_))
        ));
    }

    #[test]
    fn test_encode_media_frame() {
        let chunk = AudioChunk::from_base64("BBB=").unwrap();
        let raw = encode_media_frame("SX1", &chunk).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value,
            json!({"event": "media", "streamSid": "SX1", "media": {"payload": "BBB="}})
        );
    }

    #[test]
    fn test_encode_clear_frame() {
        let raw = encode_clear_frame("SX1").unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value, json!({"event": "clear", "streamSid": "SX1"}));
    }
}
