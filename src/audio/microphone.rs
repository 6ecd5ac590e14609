// Microphone capture via cpal
//
// The cpal stream is owned by a dedicated thread for the lifetime of the
// device claim: `acquire` spawns the thread and waits until the stream is
// playing, `stop` signals the thread to drop it. Blocks are only forwarded
// once `start` has been called.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::backend::{AudioFrame, CaptureBackend, CaptureConfig};
use super::pcm::{resample_linear, to_mono};
use crate::error::{Result, VoiceError};

/// Microphone capture backend
pub struct MicrophoneBackend {
    config: CaptureConfig,
    worker: Option<StreamWorker>,
    frames_rx: Option<mpsc::Receiver<AudioFrame>>,
    forwarding: Arc<AtomicBool>,
    capturing: bool,
}

struct StreamWorker {
    stop_tx: std::sync::mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl MicrophoneBackend {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            worker: None,
            frames_rx: None,
            forwarding: Arc::new(AtomicBool::new(false)),
            capturing: false,
        }
    }

    /// List available input devices
    pub fn list_input_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| VoiceError::DeviceUnavailable(format!("cannot enumerate devices: {}", e)))?;

        Ok(devices
            .filter_map(|d| d.description().ok().map(|desc| desc.name().to_owned()))
            .collect())
    }
}

#[async_trait::async_trait]
impl CaptureBackend for MicrophoneBackend {
    async fn acquire(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let (frame_tx, frame_rx) = mpsc::channel(100);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel();
        let config = self.config.clone();
        let forwarding = Arc::clone(&self.forwarding);

        let handle = std::thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || run_input_stream(config, frame_tx, forwarding, ready_tx, stop_rx))
            .map_err(|e| VoiceError::DeviceUnavailable(format!("failed to spawn capture thread: {}", e)))?;

        match ready_rx.await {
            Ok(Ok(device_name)) => {
                info!("Microphone acquired: {}", device_name);
                self.worker = Some(StreamWorker { stop_tx, handle });
                self.frames_rx = Some(frame_rx);
                Ok(())
            }
            Ok(Err(e)) => {
                join_worker(handle).await;
                Err(e)
            }
            Err(_) => {
                join_worker(handle).await;
                Err(VoiceError::DeviceUnavailable("capture thread exited during setup".into()))
            }
        }
    }

    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let rx = self
            .frames_rx
            .take()
            .ok_or_else(|| VoiceError::DeviceUnavailable("microphone not acquired".into()))?;

        self.forwarding.store(true, Ordering::SeqCst);
        self.capturing = true;
        info!(
            "Microphone capture started ({}Hz, {} channel)",
            self.config.target_sample_rate, self.config.target_channels
        );
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.forwarding.store(false, Ordering::SeqCst);
        self.frames_rx = None;

        if let Some(worker) = self.worker.take() {
            info!("Releasing microphone");
            let _ = worker.stop_tx.send(());
            join_worker(worker.handle).await;
        }

        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

/// Wait for the capture thread to exit without blocking the runtime
async fn join_worker(handle: JoinHandle<()>) {
    match tokio::task::spawn_blocking(move || handle.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => error!("Microphone capture thread panicked"),
        Err(e) => error!("Failed to join microphone capture thread: {}", e),
    }
}

fn run_input_stream(
    config: CaptureConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
    forwarding: Arc<AtomicBool>,
    ready: oneshot::Sender<Result<String>>,
    stop_rx: std::sync::mpsc::Receiver<()>,
) {
    let stream = match build_input_stream(&config, frame_tx, forwarding) {
        Ok((stream, device_name)) => {
            let _ = ready.send(Ok(device_name));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    // Hold the stream until stop is requested or the backend is dropped
    let _ = stop_rx.recv();
    drop(stream);
    debug!("Microphone stream dropped");
}

fn build_input_stream(
    config: &CaptureConfig,
    frame_tx: mpsc::Sender<AudioFrame>,
    forwarding: Arc<AtomicBool>,
) -> Result<(cpal::Stream, String)> {
    let host = cpal::default_host();

    let device = match &config.device {
        Some(name) => host
            .input_devices()
            .map_err(|e| VoiceError::DeviceUnavailable(format!("cannot enumerate devices: {}", e)))?
            .find(|d| d.description().map(|desc| desc.name() == name).unwrap_or(false))
            .ok_or_else(|| VoiceError::DeviceUnavailable(format!("input device '{}' not found", name)))?,
        None => host
            .default_input_device()
            .ok_or_else(|| VoiceError::DeviceUnavailable("no default input device".into()))?,
    };

    let device_name = device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into());

    let default_config = device
        .default_input_config()
        .map_err(|e| VoiceError::DeviceUnavailable(format!("no default input config: {}", e)))?;

    let native_rate = default_config.sample_rate();
    let native_channels = default_config.channels();
    let stream_config = StreamConfig {
        channels: native_channels,
        sample_rate: native_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    if native_rate != config.target_sample_rate {
        info!(
            "Will resample microphone from {}Hz to {}Hz",
            native_rate, config.target_sample_rate
        );
    }

    let target_rate = config.target_sample_rate;
    let started = Instant::now();

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                if !forwarding.load(Ordering::Relaxed) {
                    return;
                }

                let mono = to_mono(data, native_channels);
                let samples = resample_linear(&mono, native_rate, target_rate);

                let frame = AudioFrame {
                    samples,
                    sample_rate: target_rate,
                    channels: 1,
                    timestamp_ms: started.elapsed().as_millis() as u64,
                };

                // Never block the audio thread
                if frame_tx.try_send(frame).is_err() {
                    warn!("Capture channel full, dropping microphone block");
                }
            },
            move |err| {
                error!("Microphone stream error: {}", err);
            },
            None,
        )
        .map_err(|e| VoiceError::DeviceUnavailable(format!("failed to build input stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| VoiceError::DeviceUnavailable(format!("failed to start input stream: {}", e)))?;

    Ok((stream, device_name))
}
