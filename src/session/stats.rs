use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistics about the current (or last) voice session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    /// Identifier used in logs
    pub session_id: Option<String>,

    /// When the session started
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since start, if a session has run
    pub duration_secs: f64,

    /// Microphone frames queued for the remote service
    pub frames_sent: u64,

    /// Assistant audio units handed to the output
    pub units_scheduled: u64,

    /// Barge-in events received
    pub interruptions: u64,

    /// Function calls received
    pub tool_calls: u64,

    /// Inbound audio frames dropped as undecodable
    pub decode_failures: u64,
}

/// Live counters owned by the session
///
/// Published through a `watch` channel; clones share `frames_sent` with the
/// capture pump.
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionCounters {
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub frames_sent: Arc<AtomicU64>,
    pub units_scheduled: u64,
    pub interruptions: u64,
    pub tool_calls: u64,
    pub decode_failures: u64,
}

impl SessionCounters {
    /// Fresh counters for a new session
    pub fn begin(session_id: String) -> Self {
        Self {
            session_id: Some(session_id),
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> SessionStats {
        let duration_secs = self
            .started_at
            .map(|start| Utc::now().signed_duration_since(start).num_milliseconds() as f64 / 1000.0)
            .unwrap_or(0.0);

        SessionStats {
            session_id: self.session_id.clone(),
            started_at: self.started_at,
            duration_secs,
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            units_scheduled: self.units_scheduled,
            interruptions: self.interruptions,
            tool_calls: self.tool_calls,
            decode_failures: self.decode_failures,
        }
    }
}
