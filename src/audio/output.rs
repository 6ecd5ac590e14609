// Output device abstraction and cpal speaker implementation
//
// The device owns the playback clock: `current_time` is the number of frames
// rendered since `open`, in seconds. Units are placed on that timeline at an
// absolute start time and report `PlaybackEvent::Ended` once fully rendered.
// Units removed with `stop_unit` or `close` never report.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::StreamConfig;
use tokio::runtime::RuntimeFlavor;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::pcm::{resample_to_len, AudioBuffer};
use crate::error::{Result, VoiceError};

/// Identifier of a scheduled playback unit
pub type UnitId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// The unit finished playing naturally
    Ended(UnitId),
}

/// Audio output with a sample-accurate clock
pub trait OutputDevice: Send + Sync {
    /// Claim the device; completion events are sent on `events`
    fn open(&mut self, events: mpsc::UnboundedSender<PlaybackEvent>) -> Result<()>;

    /// Seconds on the device clock
    fn current_time(&self) -> f64;

    /// Play `buffer` starting at `at` seconds on the device clock
    fn start_unit(&mut self, id: UnitId, buffer: AudioBuffer, at: f64) -> Result<()>;

    /// Stop a unit immediately, wherever it is
    fn stop_unit(&mut self, id: UnitId);

    /// Release the device, dropping every unit
    fn close(&mut self);

    fn name(&self) -> &str;
}

struct Voice {
    id: UnitId,
    start_frame: u64,
    samples: Vec<f32>,
}

struct Timeline {
    sample_rate: u32,
    position: u64,
    voices: Vec<Voice>,
    events: Option<mpsc::UnboundedSender<PlaybackEvent>>,
}

impl Timeline {
    fn new() -> Self {
        Self {
            sample_rate: 0,
            position: 0,
            voices: Vec::new(),
            events: None,
        }
    }

    /// Add a unit covering device frames `round(at * rate)..round(end * rate)`
    ///
    /// Both edges are rounded from seconds, so a unit starting where the
    /// previous one ended shares its boundary frame exactly.
    fn place(&mut self, id: UnitId, buffer: &AudioBuffer, at: f64) {
        let rate = self.sample_rate as f64;
        let start = at.max(0.0);
        let start_frame = (start * rate).round() as u64;
        let end_frame = ((start + buffer.duration()) * rate).round() as u64;
        let samples = resample_to_len(&buffer.to_mono(), end_frame.saturating_sub(start_frame) as usize);

        debug!("Unit {} at frame {} ({} samples)", id, start_frame, samples.len());
        self.voices.push(Voice {
            id,
            start_frame,
            samples,
        });
    }

    fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let frames = out.len() / channels;

        for frame in 0..frames {
            let pos = self.position + frame as u64;
            let mut sum = 0.0;
            for voice in &self.voices {
                if pos >= voice.start_frame {
                    if let Some(sample) = voice.samples.get((pos - voice.start_frame) as usize) {
                        sum += sample;
                    }
                }
            }
            out[frame * channels..(frame + 1) * channels].fill(sum);
        }
        self.position += frames as u64;

        let position = self.position;
        let events = &self.events;
        self.voices.retain(|voice| {
            let finished = voice.start_frame + voice.samples.len() as u64 <= position;
            if finished {
                if let Some(tx) = events {
                    let _ = tx.send(PlaybackEvent::Ended(voice.id));
                }
            }
            !finished
        });
    }
}

struct StreamWorker {
    stop_tx: std::sync::mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Speaker output via cpal
pub struct SpeakerOutput {
    device: Option<String>,
    timeline: Arc<Mutex<Timeline>>,
    worker: Option<StreamWorker>,
}

impl SpeakerOutput {
    /// `device` selects an output by name; `None` uses the system default
    pub fn new(device: Option<String>) -> Self {
        Self {
            device,
            timeline: Arc::new(Mutex::new(Timeline::new())),
            worker: None,
        }
    }

    /// List available output devices
    pub fn list_output_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| VoiceError::DeviceUnavailable(format!("cannot enumerate devices: {}", e)))?;

        Ok(devices
            .filter_map(|d| d.description().ok().map(|desc| desc.name().to_owned()))
            .collect())
    }

    fn lock(&self) -> Option<std::sync::MutexGuard<'_, Timeline>> {
        match self.timeline.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                error!("Playback timeline lock poisoned");
                None
            }
        }
    }
}

impl OutputDevice for SpeakerOutput {
    fn open(&mut self, events: mpsc::UnboundedSender<PlaybackEvent>) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        if let Some(mut timeline) = self.lock() {
            timeline.position = 0;
            timeline.voices.clear();
            timeline.events = Some(events);
        }

        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let (stop_tx, stop_rx) = std::sync::mpsc::channel();
        let device = self.device.clone();
        let timeline = Arc::clone(&self.timeline);

        let handle = std::thread::Builder::new()
            .name("speaker-output".into())
            .spawn(move || run_output_stream(device, timeline, ready_tx, stop_rx))
            .map_err(|e| VoiceError::DeviceUnavailable(format!("failed to spawn output thread: {}", e)))?;

        match blocking(|| ready_rx.recv_timeout(Duration::from_secs(5))) {
            Ok(Ok(name)) => {
                info!("Speaker output opened: {}", name);
                self.worker = Some(StreamWorker { stop_tx, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = blocking(|| handle.join());
                Err(e)
            }
            Err(_) => {
                let _ = stop_tx.send(());
                Err(VoiceError::DeviceUnavailable("output device did not start".into()))
            }
        }
    }

    fn current_time(&self) -> f64 {
        self.lock()
            .filter(|t| t.sample_rate > 0)
            .map(|t| t.position as f64 / t.sample_rate as f64)
            .unwrap_or(0.0)
    }

    fn start_unit(&mut self, id: UnitId, buffer: AudioBuffer, at: f64) -> Result<()> {
        let mut timeline = self
            .lock()
            .ok_or_else(|| VoiceError::DeviceUnavailable("playback timeline unavailable".into()))?;

        if timeline.sample_rate == 0 {
            return Err(VoiceError::DeviceUnavailable("speaker output is not open".into()));
        }

        timeline.place(id, &buffer, at);
        Ok(())
    }

    fn stop_unit(&mut self, id: UnitId) {
        if let Some(mut timeline) = self.lock() {
            timeline.voices.retain(|voice| voice.id != id);
        }
    }

    fn close(&mut self) {
        if let Some(mut timeline) = self.lock() {
            timeline.voices.clear();
            timeline.events = None;
        }

        if let Some(worker) = self.worker.take() {
            info!("Releasing speaker output");
            let _ = worker.stop_tx.send(());
            if blocking(|| worker.handle.join()).is_err() {
                error!("Speaker output thread panicked");
            }
        }

        if let Some(mut timeline) = self.lock() {
            timeline.position = 0;
            timeline.sample_rate = 0;
        }
    }

    fn name(&self) -> &str {
        "cpal speaker"
    }
}

/// Run a blocking wait from code that may be on a runtime worker thread
///
/// On a multi-threaded runtime the worker hands its other tasks off first;
/// elsewhere (current-thread runtime, plain threads) `f` simply runs.
fn blocking<T>(f: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

fn run_output_stream(
    device_name: Option<String>,
    timeline: Arc<Mutex<Timeline>>,
    ready: std::sync::mpsc::Sender<Result<String>>,
    stop_rx: std::sync::mpsc::Receiver<()>,
) {
    let stream = match build_output_stream(device_name.as_deref(), timeline) {
        Ok((stream, name)) => {
            let _ = ready.send(Ok(name));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let _ = stop_rx.recv();
    drop(stream);
    debug!("Speaker stream dropped");
}

fn build_output_stream(
    device_name: Option<&str>,
    timeline: Arc<Mutex<Timeline>>,
) -> Result<(cpal::Stream, String)> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(name) => host
            .output_devices()
            .map_err(|e| VoiceError::DeviceUnavailable(format!("cannot enumerate devices: {}", e)))?
            .find(|d| d.description().map(|desc| desc.name() == name).unwrap_or(false))
            .ok_or_else(|| VoiceError::DeviceUnavailable(format!("output device '{}' not found", name)))?,
        None => host
            .default_output_device()
            .ok_or_else(|| VoiceError::DeviceUnavailable("no default output device".into()))?,
    };

    let name = device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into());

    let default_config = device
        .default_output_config()
        .map_err(|e| VoiceError::DeviceUnavailable(format!("no default output config: {}", e)))?;

    let stream_config = StreamConfig {
        channels: default_config.channels(),
        sample_rate: default_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    let channels = stream_config.channels as usize;

    match timeline.lock() {
        Ok(mut t) => t.sample_rate = stream_config.sample_rate,
        Err(_) => return Err(VoiceError::DeviceUnavailable("playback timeline lock poisoned".into())),
    }

    let render_timeline = Arc::clone(&timeline);
    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| match render_timeline.lock() {
                Ok(mut t) => t.render(data, channels),
                Err(_) => data.fill(0.0),
            },
            move |err| {
                warn!("Speaker stream error: {}", err);
            },
            None,
        )
        .map_err(|e| VoiceError::DeviceUnavailable(format!("failed to build output stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| VoiceError::DeviceUnavailable(format!("failed to start output stream: {}", e)))?;

    Ok((stream, name))
}
