//! Error types for the voice session engine.

/// Errors raised while running a voice session.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// Microphone permission denied or no input/output device present.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The remote session could not be established.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// An inbound audio frame could not be decoded.
    #[error("decode failure: {0}")]
    DecodeFailure(String),

    /// Mid-session channel failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Operation not allowed in the current lifecycle state.
    #[error("invalid state: cannot {operation} while {status}")]
    InvalidState {
        operation: &'static str,
        status: String,
    },

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Internal channel closed.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, VoiceError>;
