pub mod audio;
pub mod commands;
pub mod config;
pub mod error;
pub mod http;
pub mod live;
pub mod session;

pub use audio::{
    AudioFile, AudioFrame, AudioSource, CaptureBackend, CaptureBackendFactory, CaptureConfig,
    OutputDevice, PlaybackEvent, PlaybackScheduler, SpeakerOutput,
};
pub use commands::{CommandBridge, Navigator, View};
pub use config::Config;
pub use error::{Result, VoiceError};
pub use http::{create_router, AppState};
pub use live::{GeminiLiveTransport, LiveChannel, LiveTransport, OutboundMessage, TransportEvent};
pub use session::{
    ExternalContext, SessionConfig, SessionHandle, SessionStats, SessionStatus, StatusSnapshot,
    VoiceSession,
};
