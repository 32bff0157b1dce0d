//! Event vocabulary of the realtime conversational endpoint.
//!
//! Inbound events are decoded into the closed [`RealtimeEvent`] set the bridge
//! acts on; every other `type` is kept as [`RealtimeEvent::Other`] so newer
//! protocol revisions do not break a running call. Outbound events are the
//! four client messages the bridge ever sends.

use crate::{CodecError, audio::AudioChunk, session_config::SessionSettings};
use serde::{Deserialize, Serialize};

pub const SESSION_UPDATED: &str = "session.updated";
pub const SPEECH_STARTED: &str = "input_audio_buffer.speech_started";
pub const AUDIO_DELTA: &str = "response.audio.delta";
pub const FUNCTION_CALL_ARGUMENTS_DONE: &str = "response.function_call_arguments.done";
pub const ERROR: &str = "error";

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RealtimeEvent {
    /// The endpoint applied our `session.update`.
    SessionAcked,
    /// Server-side VAD detected the caller talking.
    SpeechStarted,
    /// A slice of synthesized speech.
    AudioDelta { chunk: AudioChunk },
    /// The model finished streaming the arguments of a function call.
    ToolCallArguments {
        call_id: String,
        function_name: String,
        arguments_json: String,
    },
    /// The endpoint reported a protocol-level error.
    UpstreamError { detail: String },
    /// Anything else, kept by type name only.
    Other { raw_type: String },
}

#[derive(Deserialize)]
struct EventHeader {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct AudioDeltaBody {
    delta: Option<String>,
}

#[derive(Deserialize)]
struct FunctionCallArgumentsBody {
    call_id: Option<String>,
    #[serde(default)]
    name: String,
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<serde_json::Value>,
}

/// Decodes one inbound text frame.
pub fn decode_realtime_event(raw: &str) -> Result<RealtimeEvent, CodecError> {
    let header: EventHeader = serde_json::from_str(raw)?;
    let event = match header.kind.as_str() {
        SESSION_UPDATED => RealtimeEvent::SessionAcked,
        SPEECH_STARTED => RealtimeEvent::SpeechStarted,
        AUDIO_DELTA => {
            let body: AudioDeltaBody = serde_json::from_str(raw)?;
            let delta = body.delta.ok_or(CodecError::MissingField("delta"))?;
            RealtimeEvent::AudioDelta {
                chunk: AudioChunk::from_base64(delta)?,
            }
        }
        FUNCTION_CALL_ARGUMENTS_DONE => {
            let body: FunctionCallArgumentsBody = serde_json::from_str(raw)?;
            RealtimeEvent::ToolCallArguments {
                call_id: body.call_id.ok_or(CodecError::MissingField("call_id"))?,
                function_name: body.name,
                arguments_json: body
                    .arguments
                    .ok_or(CodecError::MissingField("arguments"))?,
            }
        }
        ERROR => {
            let body: ErrorBody = serde_json::from_str(raw)?;
            let detail = match body.error {
                Some(error) => error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_owned)
                    .unwrap_or_else(|| error.to_string()),
                None => "unspecified upstream error".to_string(),
            };
            RealtimeEvent::UpstreamError { detail }
        }
        _ => RealtimeEvent::Other {
            raw_type: header.kind,
        },
    };
    Ok(event)
}

/// An item appended to the conversation by the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    FunctionCallOutput { call_id: String, output: String },
}

/// Messages the bridge sends to the realtime endpoint.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionSettings },
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    pub fn append_audio(chunk: &AudioChunk) -> Self {
        Self::InputAudioBufferAppend {
            audio: chunk.to_base64().to_owned(),
        }
    }

    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::ConversationItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: call_id.into(),
                output: output.into(),
            },
        }
    }

    /// Serializes the event into a text frame.
    pub fn encode(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }
}
