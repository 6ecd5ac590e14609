//! Live API wire format
//!
//! Every client message is a single JSON object sent as a text frame:
//! - `setup` once, as the first frame of a connection
//! - `realtimeInput` for microphone frames (`mediaChunks`) and the greeting (`text`)
//! - `toolResponse` to answer function calls
//!
//! Server messages carry any combination of `setupComplete`, `serverContent`
//! (assistant audio, interruption, transcription), `toolCall` and `goAway`.

use serde::{Deserialize, Serialize};

use crate::audio::EncodedFrame;

// ── Setup ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SetupMessage {
    pub setup: SetupPayload,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupPayload {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    /// Present (and empty) to request transcripts of the user's speech
    pub input_audio_transcription: AudioTranscriptionConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AudioTranscriptionConfig {}

impl SetupMessage {
    pub fn new(
        model: &str,
        system_instruction: String,
        voice: Option<&str>,
        functions: Vec<FunctionDeclaration>,
    ) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{}", model)
        };

        Self {
            setup: SetupPayload {
                model,
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO".to_string()],
                    speech_config: voice.map(|name| SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: name.to_string(),
                            },
                        },
                    }),
                },
                system_instruction: Some(Content {
                    parts: vec![TextPart {
                        text: system_instruction,
                    }],
                }),
                tools: if functions.is_empty() {
                    Vec::new()
                } else {
                    vec![Tool {
                        function_declarations: functions,
                    }]
                },
                input_audio_transcription: AudioTranscriptionConfig::default(),
            },
        }
    }
}

// ── Client messages ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_chunks: Option<Vec<MediaChunk>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    /// Base64-encoded PCM
    pub data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponseMessage {
    pub tool_response: ToolResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

/// Answer to one function call, correlated by `id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: serde_json::Value,
}

impl FunctionResponse {
    pub fn success(id: &str, name: &str, result: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            response: serde_json::json!({ "result": result.into() }),
        }
    }

    pub fn failure(id: &str, name: &str, error: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            response: serde_json::json!({ "error": error.into() }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.response.get("result").is_some()
    }
}

/// Message queued for the remote session
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    /// Microphone frame
    Audio(EncodedFrame),
    /// One-shot text input (the session greeting)
    Text(String),
    /// Function call results
    ToolResponse(Vec<FunctionResponse>),
    /// Close the channel
    Close,
}

impl OutboundMessage {
    /// Serialize to the JSON text frame; `Close` has no payload
    pub fn to_json(&self) -> serde_json::Result<Option<String>> {
        let json = match self {
            OutboundMessage::Audio(frame) => serde_json::to_string(&RealtimeInputMessage {
                realtime_input: RealtimeInput {
                    media_chunks: Some(vec![MediaChunk {
                        mime_type: frame.mime_type.clone(),
                        data: frame.data.clone(),
                    }]),
                    text: None,
                },
            })?,
            OutboundMessage::Text(text) => serde_json::to_string(&RealtimeInputMessage {
                realtime_input: RealtimeInput {
                    media_chunks: None,
                    text: Some(text.clone()),
                },
            })?,
            OutboundMessage::ToolResponse(responses) => {
                serde_json::to_string(&ToolResponseMessage {
                    tool_response: ToolResponse {
                        function_responses: responses.clone(),
                    },
                })?
            }
            OutboundMessage::Close => return Ok(None),
        };
        Ok(Some(json))
    }
}

// ── Server messages ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

impl ServerMessage {
    pub fn parse(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default)]
    pub inline_data: Option<InlineData>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: Option<String>,
    pub data: String,
}

impl InlineData {
    /// Sample rate declared in a `audio/pcm;rate=N` tag
    pub fn sample_rate(&self) -> Option<u32> {
        self.mime_type
            .as_deref()?
            .split(';')
            .find_map(|param| param.trim().strip_prefix("rate="))
            .and_then(|rate| rate.parse().ok())
    }

    pub fn is_audio(&self) -> bool {
        self.mime_type
            .as_deref()
            .map(|m| m.starts_with("audio/"))
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}
