//! The configuration record sent once per call in `session.update`.

use serde::{Deserialize, Serialize};
use serde_json::json;

pub const DEFAULT_INSTRUCTIONS: &str = "You are a friendly voice assistant answering phone calls. \
Keep replies short and conversational. When the caller asks for information you \
do not have, call the appropriate tool and wait for its result before answering. \
Reply in the language the caller is speaking.";

/// Server-side voice activity detection parameters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TurnDetection {
    #[serde(rename = "type")]
    pub mode: String,
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

impl Default for TurnDetection {
    fn default() -> Self {
        Self {
            mode: "server_vad".to_string(),
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InputAudioTranscription {
    pub model: String,
}

/// A function the model may call, described with a JSON schema.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ToolSchema {
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

fn function_kind() -> String {
    "function".to_string()
}

impl ToolSchema {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            kind: function_kind(),
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// The weather lookup every deployment declares unless overridden.
    pub fn weather() -> Self {
        Self::function(
            "get_weather",
            "Get current weather for a specified city",
            json!({
                "type": "object",
                "properties": {
                    "city": {
                        "type": "string",
                        "description": "The name of the city for which to fetch the weather."
                    }
                },
                "required": ["city"]
            }),
        )
    }
}

/// Immutable per-call session configuration.
///
/// Field names match the wire format of the `session` object in
/// `session.update`, so the struct serializes as-is.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub instructions: String,
    pub turn_detection: TurnDetection,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub voice: String,
    pub temperature: f32,
    pub max_response_output_tokens: u32,
    pub modalities: Vec<String>,
    pub input_audio_transcription: InputAudioTranscription,
    pub tool_choice: String,
    pub tools: Vec<ToolSchema>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            turn_detection: TurnDetection::default(),
            input_audio_format: "g711_ulaw".to_string(),
            output_audio_format: "g711_ulaw".to_string(),
            voice: "alloy".to_string(),
            temperature: 0.8,
            max_response_output_tokens: 4096,
            modalities: vec!["text".to_string(), "audio".to_string()],
            input_audio_transcription: InputAudioTranscription {
                model: "whisper-1".to_string(),
            },
            tool_choice: "auto".to_string(),
            tools: vec![ToolSchema::weather()],
        }
    }
}

impl SessionSettings {
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    /// Parses a JSON array of tool schemas, as stored in a tools file.
    pub fn parse_tools(raw: &str) -> Result<Vec<ToolSchema>, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
