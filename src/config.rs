use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub live: LiveConfig,
    pub audio: AudioConfig,
    pub assistant: AssistantConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

/// Remote speech service settings
#[derive(Debug, Clone, Deserialize)]
pub struct LiveConfig {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    /// Samples per outbound frame
    pub chunk_size: usize,
    #[serde(default)]
    pub input_device: Option<String>,
    #[serde(default)]
    pub output_device: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantConfig {
    pub name: String,
    pub instructions: String,
}

fn default_handshake_timeout() -> u64 {
    15
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        Ok(settings.try_deserialize()?)
    }

    /// Read the API key from the environment variable named in `[live]`
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.live.api_key_env)
            .with_context(|| format!("Environment variable {} is not set", self.live.api_key_env))
    }
}
