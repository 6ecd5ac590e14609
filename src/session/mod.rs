//! Voice session management
//!
//! This module provides the `VoiceSession` abstraction that manages:
//! - Microphone capture and framing into the outbound queue
//! - Demultiplexing of remote messages (function calls, audio, barge-in, transcript)
//! - Gapless playback of the assistant's speech
//! - Lifecycle state and the status shown to users
//! - Session statistics

mod adapter;
mod config;
mod engine;
mod state;
mod stats;

pub use adapter::{route, InboundAction};
pub use config::{ExternalContext, SessionConfig};
pub use engine::{SessionCommand, SessionHandle, VoiceSession};
pub use state::{derive_status, Phase, SessionStatus, StateMachine, StatusChange, StatusSnapshot};
pub use stats::SessionStats;
