//! Session lifecycle state
//!
//! The connection phase and the playback flag are tracked separately; the
//! status shown to users is derived from both. `Speaking` is never stored.

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::error::{Result, VoiceError};

/// Connection phase of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Standby,
    Connecting,
    Active,
    Error,
}

/// User-visible status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Standby,
    Connecting,
    Active,
    Speaking,
    Error,
}

impl SessionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Standby => "Standby",
            SessionStatus::Connecting => "Connecting...",
            SessionStatus::Active => "Active",
            SessionStatus::Speaking => "Speaking",
            SessionStatus::Error => "Error",
        }
    }
}

/// `Speaking` iff the connection is active and assistant audio is playing
pub fn derive_status(phase: Phase, playback_active: bool) -> SessionStatus {
    match phase {
        Phase::Standby => SessionStatus::Standby,
        Phase::Connecting => SessionStatus::Connecting,
        Phase::Active if playback_active => SessionStatus::Speaking,
        Phase::Active => SessionStatus::Active,
        Phase::Error => SessionStatus::Error,
    }
}

/// A derived status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub from: SessionStatus,
    pub to: SessionStatus,
}

/// Everything a UI shows about the session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub status: SessionStatus,
    pub label: String,
    pub speaking: bool,
    /// Latest transcript fragment of the user's speech
    pub transcript: String,
    pub context_attached: bool,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            status: SessionStatus::Standby,
            label: SessionStatus::Standby.label().to_string(),
            speaking: false,
            transcript: String::new(),
            context_attached: false,
        }
    }
}

pub struct StateMachine {
    phase: Phase,
    playback_active: bool,
    transcript: String,
    context_attached: bool,
    changes: broadcast::Sender<StatusChange>,
    snapshot: watch::Sender<StatusSnapshot>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        let (snapshot, _) = watch::channel(StatusSnapshot::default());
        Self {
            phase: Phase::Standby,
            playback_active: false,
            transcript: String::new(),
            context_attached: false,
            changes,
            snapshot,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status(&self) -> SessionStatus {
        derive_status(self.phase, self.playback_active)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.changes.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<StatusSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn change_sender(&self) -> broadcast::Sender<StatusChange> {
        self.changes.clone()
    }

    /// Standby -> Connecting
    pub fn begin_connect(&mut self) -> Result<()> {
        if self.phase != Phase::Standby {
            return Err(self.invalid("start"));
        }
        self.update(|sm| sm.phase = Phase::Connecting);
        Ok(())
    }

    /// Connecting -> Active
    pub fn connected(&mut self) -> Result<()> {
        if self.phase != Phase::Connecting {
            return Err(self.invalid("activate"));
        }
        self.update(|sm| sm.phase = Phase::Active);
        Ok(())
    }

    /// Any phase -> Error
    pub fn fail(&mut self) {
        self.update(|sm| sm.phase = Phase::Error);
    }

    /// Any phase -> Standby, clearing playback and transcript
    pub fn reset(&mut self) {
        self.update(|sm| {
            sm.phase = Phase::Standby;
            sm.playback_active = false;
            sm.transcript.clear();
        });
    }

    pub fn set_playback_active(&mut self, active: bool) {
        if self.playback_active != active {
            self.update(|sm| sm.playback_active = active);
        }
    }

    pub fn set_transcript(&mut self, text: String) {
        self.update(|sm| sm.transcript = text);
    }

    pub fn set_context_attached(&mut self, attached: bool) {
        if self.context_attached != attached {
            self.update(|sm| sm.context_attached = attached);
        }
    }

    fn invalid(&self, operation: &'static str) -> VoiceError {
        VoiceError::InvalidState {
            operation,
            status: self.status().label().to_string(),
        }
    }

    fn update(&mut self, change: impl FnOnce(&mut Self)) {
        let from = self.status();
        change(self);
        let to = self.status();

        if from != to {
            debug!("Status {:?} -> {:?}", from, to);
            // no subscribers is fine
            let _ = self.changes.send(StatusChange { from, to });
        }

        self.snapshot.send_replace(StatusSnapshot {
            status: to,
            label: to.label().to_string(),
            speaking: to == SessionStatus::Speaking,
            transcript: self.transcript.clone(),
            context_attached: self.context_attached,
        });
    }
}
