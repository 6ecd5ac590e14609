pub mod backend;
pub mod capture;
pub mod file;
pub mod microphone;
pub mod output;
pub mod pcm;
pub mod playback;

pub use backend::{AudioFrame, AudioSource, CaptureBackend, CaptureBackendFactory, CaptureConfig};
pub use capture::{run_capture_pump, CapturePipeline, EncodedFrame, DEFAULT_CHUNK_SIZE};
pub use file::{AudioFile, WavFileBackend};
pub use microphone::MicrophoneBackend;
pub use output::{OutputDevice, PlaybackEvent, SpeakerOutput, UnitId};
pub use pcm::{decode_pcm16, AudioBuffer};
pub use playback::{PlaybackScheduler, ScheduledUnit};
