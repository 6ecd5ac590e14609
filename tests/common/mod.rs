// In-memory doubles for the session's devices, transport and navigator
//
// Each double records what the session did to it in a shared probe so tests
// can inspect (and drive) it while the session owns the double itself.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use base64::Engine;
use studio_voice::audio::pcm::encode_pcm16;
use studio_voice::audio::{AudioBuffer, AudioFrame, CaptureBackend, OutputDevice, PlaybackEvent, UnitId};
use studio_voice::live::{LiveChannel, LiveTransport, OutboundMessage, ServerMessage, SetupMessage, TransportEvent};
use studio_voice::{Result, SessionConfig, View, VoiceError, VoiceSession};
use tokio::sync::mpsc;

// ── Capture ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct CaptureProbe {
    pub acquired: usize,
    pub released: usize,
    pub capturing: bool,
    /// Feeds the session's capture receiver while capturing
    pub frames: Option<mpsc::Sender<AudioFrame>>,
}

pub struct MockCapture {
    deny: bool,
    probe: Arc<Mutex<CaptureProbe>>,
}

#[async_trait::async_trait]
impl CaptureBackend for MockCapture {
    async fn acquire(&mut self) -> Result<()> {
        if self.deny {
            return Err(VoiceError::DeviceUnavailable("microphone permission denied".into()));
        }
        self.probe.lock().unwrap().acquired += 1;
        Ok(())
    }

    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let (tx, rx) = mpsc::channel(16);
        let mut probe = self.probe.lock().unwrap();
        probe.frames = Some(tx);
        probe.capturing = true;
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        let mut probe = self.probe.lock().unwrap();
        probe.released += 1;
        probe.capturing = false;
        probe.frames = None;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.probe.lock().unwrap().capturing
    }

    fn name(&self) -> &str {
        "mock capture"
    }
}

// ── Output ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct OutputProbe {
    pub now: f64,
    pub open: bool,
    pub closed: usize,
    /// (unit id, start, duration)
    pub started: Vec<(UnitId, f64, f64)>,
    pub stopped: Vec<UnitId>,
    pub events: Option<mpsc::UnboundedSender<PlaybackEvent>>,
}

impl OutputProbe {
    /// Report a unit as played to the end
    pub fn finish(&self, id: UnitId) {
        if let Some(events) = &self.events {
            let _ = events.send(PlaybackEvent::Ended(id));
        }
    }
}

pub struct MockOutput {
    probe: Arc<Mutex<OutputProbe>>,
}

impl OutputDevice for MockOutput {
    fn open(&mut self, events: mpsc::UnboundedSender<PlaybackEvent>) -> Result<()> {
        let mut probe = self.probe.lock().unwrap();
        probe.open = true;
        probe.events = Some(events);
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.probe.lock().unwrap().now
    }

    fn start_unit(&mut self, id: UnitId, buffer: AudioBuffer, at: f64) -> Result<()> {
        self.probe
            .lock()
            .unwrap()
            .started
            .push((id, at, buffer.duration()));
        Ok(())
    }

    fn stop_unit(&mut self, id: UnitId) {
        self.probe.lock().unwrap().stopped.push(id);
    }

    fn close(&mut self) {
        let mut probe = self.probe.lock().unwrap();
        probe.open = false;
        probe.closed += 1;
        probe.events = None;
    }

    fn name(&self) -> &str {
        "mock output"
    }
}

// ── Transport ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct TransportProbe {
    pub setups: Vec<SetupMessage>,
    /// Everything the session queued for the remote side
    pub outbound: Option<mpsc::UnboundedReceiver<OutboundMessage>>,
    /// Injects remote events into the session
    pub inbound: Option<mpsc::Sender<TransportEvent>>,
}

impl TransportProbe {
    /// Drain the outbound queue without waiting
    pub fn sent(&mut self) -> Vec<OutboundMessage> {
        let mut sent = Vec::new();
        if let Some(rx) = self.outbound.as_mut() {
            while let Ok(message) = rx.try_recv() {
                sent.push(message);
            }
        }
        sent
    }

    /// Messages waiting in the outbound queue
    pub fn queued(&self) -> usize {
        self.outbound.as_ref().map_or(0, |rx| rx.len())
    }

    pub fn instruction(&self, index: usize) -> String {
        self.setups[index]
            .setup
            .system_instruction
            .as_ref()
            .map(|content| content.parts[0].text.clone())
            .unwrap_or_default()
    }
}

pub struct MockTransport {
    fail: bool,
    hang: bool,
    probe: Arc<Mutex<TransportProbe>>,
}

#[async_trait::async_trait]
impl LiveTransport for MockTransport {
    async fn connect(&self, setup: &SetupMessage) -> Result<LiveChannel> {
        self.probe.lock().unwrap().setups.push(setup.clone());
        if self.hang {
            // the remote side never acknowledges the setup
            std::future::pending::<()>().await;
        }

        let mut probe = self.probe.lock().unwrap();
        if self.fail {
            return Err(VoiceError::HandshakeFailed("no setupComplete".into()));
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(32);
        probe.outbound = Some(outbound_rx);
        probe.inbound = Some(inbound_tx);
        Ok(LiveChannel::new(outbound_tx, inbound_rx))
    }

    fn name(&self) -> &str {
        "mock transport"
    }
}

// ── Harness ────────────────────────────────────────────────────────

#[derive(Default, Clone, Copy)]
pub struct Options {
    pub deny_microphone: bool,
    pub fail_handshake: bool,
    pub hang_handshake: bool,
}

pub struct Harness {
    pub session: VoiceSession,
    pub capture: Arc<Mutex<CaptureProbe>>,
    pub output: Arc<Mutex<OutputProbe>>,
    pub transport: Arc<Mutex<TransportProbe>>,
    pub views: Arc<Mutex<Vec<View>>>,
    /// Outbound queue length seen by each navigation
    pub queued_at_navigation: Arc<Mutex<Vec<usize>>>,
}

pub fn harness() -> Harness {
    harness_with(Options::default())
}

pub fn harness_with(options: Options) -> Harness {
    let capture = Arc::new(Mutex::new(CaptureProbe::default()));
    let output = Arc::new(Mutex::new(OutputProbe::default()));
    let transport = Arc::new(Mutex::new(TransportProbe::default()));
    let views = Arc::new(Mutex::new(Vec::new()));
    let queued_at_navigation = Arc::new(Mutex::new(Vec::new()));

    let seen = Arc::clone(&views);
    let queued = Arc::clone(&queued_at_navigation);
    let remote = Arc::clone(&transport);
    let navigator = move |view: View| -> anyhow::Result<()> {
        seen.lock().unwrap().push(view);
        queued.lock().unwrap().push(remote.lock().unwrap().queued());
        Ok(())
    };

    let session = VoiceSession::new(
        SessionConfig::default(),
        Box::new(MockCapture {
            deny: options.deny_microphone,
            probe: Arc::clone(&capture),
        }),
        Box::new(MockOutput {
            probe: Arc::clone(&output),
        }),
        Arc::new(MockTransport {
            fail: options.fail_handshake,
            hang: options.hang_handshake,
            probe: Arc::clone(&transport),
        }),
        Box::new(navigator),
    );

    Harness {
        session,
        capture,
        output,
        transport,
        views,
        queued_at_navigation,
    }
}

// ── Server messages ────────────────────────────────────────────────

/// Base64 PCM16 payload of `samples` mono samples
pub fn pcm_payload(samples: usize) -> String {
    base64::engine::general_purpose::STANDARD.encode(encode_pcm16(&vec![0.25; samples]))
}

pub fn server_event(json: &str) -> TransportEvent {
    TransportEvent::Message(ServerMessage::parse(json).unwrap())
}

/// A model turn carrying one 24 kHz audio frame
pub fn audio_event(samples: usize) -> TransportEvent {
    server_event(&format!(
        r#"{{"serverContent": {{"modelTurn": {{"parts": [{{"inlineData": {{"mimeType": "audio/pcm;rate=24000", "data": "{}"}}}}]}}}}}}"#,
        pcm_payload(samples)
    ))
}

pub fn interrupted_event() -> TransportEvent {
    server_event(r#"{"serverContent": {"interrupted": true}}"#)
}

pub fn navigate_event(id: &str, view: &str) -> TransportEvent {
    server_event(&format!(
        r#"{{"toolCall": {{"functionCalls": [{{"id": "{}", "name": "navigateTo", "args": {{"view": "{}"}}}}]}}}}"#,
        id, view
    ))
}
