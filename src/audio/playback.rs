// Gapless playback scheduling
//
// Every inbound audio frame becomes one unit on the output device timeline.
// Units are placed back to back: a unit starts when the previous one ends, or
// immediately when the output has already caught up (`next_start` in the past).
// Barge-in stops everything at once and rewinds the cursor.

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::output::{OutputDevice, PlaybackEvent, UnitId};
use super::pcm::{decode_base64_pcm16, decode_pcm16, AudioBuffer};
use crate::error::Result;

/// A unit handed to the output device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledUnit {
    pub id: UnitId,
    /// Start time in seconds on the output clock
    pub start: f64,
    /// Duration in seconds
    pub duration: f64,
}

impl ScheduledUnit {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

pub struct PlaybackScheduler {
    device: Box<dyn OutputDevice>,
    sample_rate: u32,
    channels: u16,
    next_start: f64,
    active: BTreeMap<UnitId, ScheduledUnit>,
    next_id: UnitId,
    open: bool,
}

impl PlaybackScheduler {
    pub fn new(device: Box<dyn OutputDevice>, sample_rate: u32, channels: u16) -> Self {
        Self {
            device,
            sample_rate,
            channels,
            next_start: 0.0,
            active: BTreeMap::new(),
            next_id: 0,
            open: false,
        }
    }

    /// Claim the output device for a session
    pub fn open(&mut self, events: mpsc::UnboundedSender<PlaybackEvent>) -> Result<()> {
        self.device.open(events)?;
        self.open = true;
        info!("Playback output opened: {}", self.device.name());
        Ok(())
    }

    /// Stop everything and release the output device
    pub fn close(&mut self) {
        self.interrupt();
        if self.open {
            self.device.close();
            self.open = false;
            info!("Playback output closed");
        }
    }

    /// Decode one raw PCM frame and queue it after everything already scheduled
    pub fn schedule(&mut self, bytes: &[u8]) -> Result<ScheduledUnit> {
        let buffer = decode_pcm16(bytes, self.sample_rate, self.channels).map_err(|e| {
            warn!("Dropping undecodable audio frame: {}", e);
            e
        })?;
        self.schedule_buffer(buffer)
    }

    /// Same as [`schedule`](Self::schedule) for a base64 wire payload
    ///
    /// `declared_rate` is the rate tagged on the frame, if any; untagged
    /// frames use the configured output rate.
    pub fn schedule_base64(&mut self, data: &str, declared_rate: Option<u32>) -> Result<ScheduledUnit> {
        let sample_rate = declared_rate.filter(|&rate| rate > 0).unwrap_or(self.sample_rate);
        let buffer = decode_base64_pcm16(data, sample_rate, self.channels).map_err(|e| {
            warn!("Dropping undecodable audio frame: {}", e);
            e
        })?;
        self.schedule_buffer(buffer)
    }

    /// Place an already decoded buffer on the timeline
    pub fn schedule_buffer(&mut self, buffer: AudioBuffer) -> Result<ScheduledUnit> {
        let now = self.device.current_time();
        let start = self.next_start.max(now);
        let duration = buffer.duration();
        let id = self.next_id;

        self.device.start_unit(id, buffer, start)?;

        self.next_id += 1;
        let unit = ScheduledUnit { id, start, duration };
        self.active.insert(id, unit);
        self.next_start = unit.end();

        debug!(
            "Scheduled unit {} at {:.3}s for {:.3}s ({} active)",
            id,
            start,
            duration,
            self.active.len()
        );
        Ok(unit)
    }

    /// Remove a unit that finished naturally
    ///
    /// Returns `true` when this emptied the active set. Unknown ids (already
    /// removed by an interrupt) are ignored and return `false`.
    pub fn complete(&mut self, id: UnitId) -> bool {
        if self.active.remove(&id).is_none() {
            debug!("Ignoring completion of unknown unit {}", id);
            return false;
        }
        self.active.is_empty()
    }

    /// Stop every active unit and rewind the cursor; returns how many stopped
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.active.len();
        for id in std::mem::take(&mut self.active).into_keys() {
            self.device.stop_unit(id);
        }
        self.next_start = 0.0;

        if stopped > 0 {
            info!("Playback interrupted, stopped {} unit(s)", stopped);
        }
        stopped
    }

    pub fn next_start(&self) -> f64 {
        self.next_start
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Whether any unit is scheduled or playing
    pub fn is_active(&self) -> bool {
        !self.active.is_empty()
    }
}
