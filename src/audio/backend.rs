use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::error::Result;

/// Block of captured audio samples
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Normalized samples in [-1.0, 1.0] (interleaved when multi-channel)
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels.max(1) as f64)
    }
}

/// Configuration for a capture backend
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate (will resample if needed)
    pub target_sample_rate: u32,
    /// Target channel count (1 = mono)
    pub target_channels: u16,
    /// Block size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
    /// Input device name; `None` picks the system default
    pub device: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000, // Live API input rate
            target_channels: 1,        // Mono
            buffer_duration_ms: 100,   // 100ms blocks
            device: None,
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal default or named input device
/// - File: replays a WAV file in real time (testing / demos)
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Claim the input device
    ///
    /// Fails with `VoiceError::DeviceUnavailable` when permission is denied
    /// or no device exists. The device stays claimed until `stop`.
    async fn acquire(&mut self) -> Result<()>;

    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing and release the device
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Capture source type
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Microphone input
    Microphone,
    /// WAV file replayed as if it were a microphone
    File(PathBuf),
}

/// Capture backend factory
pub struct CaptureBackendFactory;

impl CaptureBackendFactory {
    pub fn create(source: AudioSource, config: CaptureConfig) -> Box<dyn CaptureBackend> {
        match source {
            AudioSource::Microphone => Box::new(super::microphone::MicrophoneBackend::new(config)),
            AudioSource::File(path) => Box::new(super::file::WavFileBackend::new(path, config)),
        }
    }
}
