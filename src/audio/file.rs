use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use hound::{SampleFormat, WavReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioFrame, CaptureBackend, CaptureConfig};
use super::pcm::{resample_linear, to_mono, PCM_SCALE};
use crate::error::{Result, VoiceError};

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Normalized interleaved samples
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;
        let spec = reader.spec();

        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Int if spec.bits_per_sample == 16 => reader
                .into_samples::<i16>()
                .map(|s| s.map(|v| v as f32 / PCM_SCALE))
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            SampleFormat::Int => anyhow::bail!(
                "Unsupported WAV sample width: {} bits",
                spec.bits_per_sample
            ),
        };

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Mono samples at the requested rate
    pub fn to_mono(&self, target_rate: u32) -> Vec<f32> {
        let mono = to_mono(&self.samples, self.channels);
        resample_linear(&mono, self.sample_rate, target_rate)
    }
}

/// Replays a WAV file through the capture path as if it were a microphone
pub struct WavFileBackend {
    path: PathBuf,
    config: CaptureConfig,
    paced: bool,
    samples: Option<Vec<f32>>,
    task: Option<JoinHandle<()>>,
}

impl WavFileBackend {
    pub fn new(path: PathBuf, config: CaptureConfig) -> Self {
        Self {
            path,
            config,
            paced: true,
            samples: None,
            task: None,
        }
    }

    /// Emit blocks as fast as the receiver takes them
    pub fn without_pacing(mut self) -> Self {
        self.paced = false;
        self
    }
}

#[async_trait::async_trait]
impl CaptureBackend for WavFileBackend {
    async fn acquire(&mut self) -> Result<()> {
        let file = AudioFile::open(&self.path)
            .map_err(|e| VoiceError::DeviceUnavailable(format!("{:#}", e)))?;
        self.samples = Some(file.to_mono(self.config.target_sample_rate));
        Ok(())
    }

    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let samples = self
            .samples
            .take()
            .ok_or_else(|| VoiceError::DeviceUnavailable("audio file not acquired".into()))?;

        let (tx, rx) = mpsc::channel(100);
        let rate = self.config.target_sample_rate;
        let block_ms = self.config.buffer_duration_ms.max(1);
        let block_len = ((rate as u64 * block_ms) / 1000).max(1) as usize;
        let paced = self.paced;

        info!(
            "Replaying {} as capture input ({} samples per block)",
            self.path.display(),
            block_len
        );

        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(block_ms));
            for (i, block) in samples.chunks(block_len).enumerate() {
                if paced {
                    interval.tick().await;
                }
                let frame = AudioFrame {
                    samples: block.to_vec(),
                    sample_rate: rate,
                    channels: 1,
                    timestamp_ms: i as u64 * block_ms,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
            debug!("Audio file replay finished");
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.samples = None;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}
