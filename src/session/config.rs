use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Result, VoiceError};

/// Configuration for a voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Model identifier, with or without the `models/` prefix
    pub model: String,

    /// Prebuilt voice for the assistant's speech
    pub voice: Option<String>,

    /// Microphone frames are sent at this rate (16kHz)
    pub input_sample_rate: u32,

    /// Assistant audio arrives at this rate (24kHz)
    pub output_sample_rate: u32,

    /// Channels in inbound assistant audio
    pub output_channels: u16,

    /// Samples per outbound frame
    pub chunk_size: usize,

    /// Name the assistant introduces itself with
    pub assistant_name: String,

    /// Persona and guidelines placed in the system instruction
    pub instructions: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            voice: None,
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            output_channels: 1,
            chunk_size: 4096,
            assistant_name: "Studio Assistant".to_string(),
            instructions: "Respond ONLY in English.".to_string(),
        }
    }
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            model: config.live.model.clone(),
            voice: config.live.voice.clone(),
            input_sample_rate: config.audio.input_sample_rate,
            output_sample_rate: config.audio.output_sample_rate,
            output_channels: 1,
            chunk_size: config.audio.chunk_size,
            assistant_name: config.assistant.name.clone(),
            instructions: config.assistant.instructions.trim().to_string(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.input_sample_rate == 0 || self.output_sample_rate == 0 {
            return Err(VoiceError::Config("sample rates must be non-zero".into()));
        }
        if self.output_channels == 0 {
            return Err(VoiceError::Config("output channel count must be non-zero".into()));
        }
        if self.chunk_size == 0 {
            return Err(VoiceError::Config("chunk_size must be non-zero".into()));
        }
        Ok(())
    }

    /// System instruction for a session, embedding the context captured at start
    pub fn system_instruction(&self, context: &ExternalContext) -> String {
        let dynamic = match (context.document(), &context.name) {
            (Some(document), Some(name)) => format!("USER DOCUMENT ({}): {}", name, document),
            (Some(document), None) => format!("USER DOCUMENT: {}", document),
            (None, _) => "No specific document is loaded.".to_string(),
        };

        format!(
            "IDENTITY: You are the \"{}\".\n\n{}\n\nDYNAMIC CONTEXT:\n{}\n\n\
             If asked about the document the user is working on, use the dynamic context section.",
            self.assistant_name, self.instructions, dynamic
        )
    }

    /// Text sent right after the handshake so the assistant opens the conversation
    pub fn greeting(&self, context: &ExternalContext) -> String {
        match &context.name {
            Some(name) => format!(
                "Greetings. I am the {}. I am also synchronized with the active document: {}.",
                self.assistant_name, name
            ),
            None => format!("Greetings. I am the {}. The workspace is ready.", self.assistant_name),
        }
    }
}

/// Host-provided document context
///
/// Read once when a session starts; later changes apply to the next session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalContext {
    /// Document text made available to the assistant
    pub document: Option<String>,

    /// Display name of the active document
    pub name: Option<String>,
}

impl ExternalContext {
    /// Document text, if any; an empty document counts as none
    pub fn document(&self) -> Option<&str> {
        self.document.as_deref().filter(|text| !text.is_empty())
    }

    pub fn is_attached(&self) -> bool {
        self.document().is_some()
    }
}
