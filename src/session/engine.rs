use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::adapter::{route, InboundAction};
use super::config::{ExternalContext, SessionConfig};
use super::state::{Phase, SessionStatus, StateMachine, StatusChange, StatusSnapshot};
use super::stats::{SessionCounters, SessionStats};
use crate::audio::{
    run_capture_pump, CaptureBackend, CapturePipeline, OutputDevice, PlaybackEvent, PlaybackScheduler,
};
use crate::commands::{CommandBridge, Navigator};
use crate::error::{Result, VoiceError};
use crate::live::{FunctionCall, LiveChannel, LiveTransport, OutboundMessage, SetupMessage, TransportEvent};

/// Requests accepted by a running session task
#[derive(Debug)]
pub enum SessionCommand {
    Start {
        reply: oneshot::Sender<Result<()>>,
    },
    Stop {
        reply: oneshot::Sender<SessionStats>,
    },
    SetContext(ExternalContext),
    Shutdown,
}

/// A full-duplex voice session with the remote assistant
///
/// One value owns every piece of session state. All inputs (host commands,
/// remote messages, playback completions) are applied one at a time, either
/// by calling the handlers directly or through [`VoiceSession::run`].
pub struct VoiceSession {
    config: SessionConfig,
    capture: Box<dyn CaptureBackend>,
    scheduler: PlaybackScheduler,
    transport: Arc<dyn LiveTransport>,
    bridge: CommandBridge,
    state: StateMachine,
    context: ExternalContext,
    channel: Option<LiveChannel>,
    capture_task: Option<JoinHandle<()>>,
    playback_tx: mpsc::UnboundedSender<PlaybackEvent>,
    playback_rx: mpsc::UnboundedReceiver<PlaybackEvent>,
    counters: watch::Sender<SessionCounters>,
}

impl VoiceSession {
    pub fn new(
        config: SessionConfig,
        capture: Box<dyn CaptureBackend>,
        output: Box<dyn OutputDevice>,
        transport: Arc<dyn LiveTransport>,
        navigator: Box<dyn Navigator>,
    ) -> Self {
        let scheduler =
            PlaybackScheduler::new(output, config.output_sample_rate, config.output_channels);
        let (playback_tx, playback_rx) = mpsc::unbounded_channel();
        let (counters, _) = watch::channel(SessionCounters::default());

        Self {
            config,
            capture,
            scheduler,
            transport,
            bridge: CommandBridge::new(navigator),
            state: StateMachine::new(),
            context: ExternalContext::default(),
            channel: None,
            capture_task: None,
            playback_tx,
            playback_rx,
            counters,
        }
    }

    /// Connect and start streaming
    ///
    /// Only fails with `InvalidState` when a session is already running.
    /// Device and handshake failures are logged and leave the session in
    /// `Standby` (after passing through `Error`).
    pub async fn start(&mut self) -> Result<()> {
        self.state.begin_connect()?;

        self.counters
            .send_replace(SessionCounters::begin(uuid::Uuid::new_v4().to_string()));
        let session_id = self.session_id();
        let context = self.context.clone();
        info!(
            session_id = %session_id,
            transport = self.transport.name(),
            capture = self.capture.name(),
            context_attached = context.is_attached(),
            "Starting voice session"
        );

        match self.connect(&context).await {
            Ok(()) => {
                info!(session_id = %session_id, "Voice session active");
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "Voice session failed to start");
                self.state.fail();
                self.teardown().await;
            }
        }

        Ok(())
    }

    async fn connect(&mut self, context: &ExternalContext) -> Result<()> {
        self.capture.acquire().await?;
        self.scheduler.open(self.playback_tx.clone())?;

        let setup = SetupMessage::new(
            &self.config.model,
            self.config.system_instruction(context),
            self.config.voice.as_deref(),
            self.bridge.declarations(),
        );
        let channel = self.transport.connect(&setup).await?;
        self.state.connected()?;

        channel.send(OutboundMessage::Text(self.config.greeting(context)))?;
        let outbound = channel.sender();
        self.channel = Some(channel);

        let audio_rx = self.capture.start().await?;
        let pipeline = CapturePipeline::new(self.config.chunk_size, self.config.input_sample_rate);
        let frames_sent = Arc::clone(&self.counters.borrow().frames_sent);
        self.capture_task = Some(tokio::spawn(run_capture_pump(
            pipeline,
            audio_rx,
            outbound,
            frames_sent,
        )));

        Ok(())
    }

    /// End the session and release every resource; a no-op in `Standby`
    pub async fn stop(&mut self) {
        if self.state.phase() == Phase::Standby {
            debug!("Stop requested while in standby");
            return;
        }

        info!(session_id = %self.session_id(), "Stopping voice session");
        self.teardown().await;
    }

    /// Release resources in order: capture, playback, channel, then state
    async fn teardown(&mut self) {
        if let Some(task) = self.capture_task.take() {
            task.abort();
        }
        if let Err(e) = self.capture.stop().await {
            warn!("Failed to release capture device: {}", e);
        }

        self.scheduler.close();

        if let Some(channel) = self.channel.take() {
            channel.close();
        }

        self.state.reset();
        info!(session_id = %self.session_id(), "Voice session in standby");
    }

    /// Apply one event from the remote channel
    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Message(message) => {
                for action in route(message) {
                    self.apply(action);
                }
            }
            TransportEvent::Error(e) => {
                let e = VoiceError::Transport(e);
                error!(session_id = %self.session_id(), error = %e, "Remote channel failed");
                self.state.fail();
                self.teardown().await;
            }
            TransportEvent::Closed => {
                info!(session_id = %self.session_id(), "Remote channel closed");
                self.teardown().await;
            }
        }
    }

    /// Apply one event from the output device
    pub fn handle_playback_event(&mut self, event: PlaybackEvent) {
        match event {
            PlaybackEvent::Ended(id) => {
                if self.scheduler.complete(id) {
                    debug!("Assistant finished speaking");
                    self.state.set_playback_active(false);
                }
            }
        }
    }

    fn apply(&mut self, action: InboundAction) {
        match action {
            InboundAction::ToolCall(call) => self.handle_tool_call(call),
            InboundAction::Audio(inline) => {
                match self.scheduler.schedule_base64(&inline.data, inline.sample_rate()) {
                    Ok(_) => {
                        self.counters.send_modify(|c| c.units_scheduled += 1);
                        self.state.set_playback_active(true);
                    }
                    Err(VoiceError::DecodeFailure(_)) => {
                        self.counters.send_modify(|c| c.decode_failures += 1)
                    }
                    Err(e) => warn!("Failed to schedule assistant audio: {}", e),
                }
            }
            InboundAction::Interrupt => {
                self.counters.send_modify(|c| c.interruptions += 1);
                self.scheduler.interrupt();
                self.state.set_playback_active(false);
            }
            InboundAction::Transcript(text) => {
                debug!("Transcript: {}", text);
                self.state.set_transcript(text);
            }
        }
    }

    fn handle_tool_call(&mut self, call: FunctionCall) {
        self.counters.send_modify(|c| c.tool_calls += 1);
        info!(
            session_id = %self.session_id(),
            call_id = %call.id,
            function = %call.name,
            "Function call received"
        );

        let Some(response) = self.bridge.dispatch(&call) else {
            return;
        };

        match &self.channel {
            Some(channel) => {
                if let Err(e) = channel.send(OutboundMessage::ToolResponse(vec![response])) {
                    warn!("Failed to queue function response {}: {}", call.id, e);
                }
            }
            None => warn!("No channel for function response {}", call.id),
        }
    }

    /// Replace the document context used by the next session
    pub fn set_context(&mut self, context: ExternalContext) {
        if self.state.phase() != Phase::Standby {
            info!("Context updated; it applies to the next session");
        }
        self.state.set_context_attached(context.is_attached());
        self.context = context;
    }

    pub fn context(&self) -> &ExternalContext {
        &self.context
    }

    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.state.snapshot()
    }

    pub fn watch(&self) -> watch::Receiver<StatusSnapshot> {
        self.state.watch()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.state.subscribe()
    }

    pub fn scheduler(&self) -> &PlaybackScheduler {
        &self.scheduler
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_capturing()
    }

    pub fn stats(&self) -> SessionStats {
        self.counters.borrow().snapshot()
    }

    fn session_id(&self) -> String {
        self.counters.borrow().session_id.clone().unwrap_or_default()
    }

    /// Drive the session from a command channel until shutdown
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        info!("Voice session task started");

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Start { reply }) => {
                        let result = self.start().await;
                        let _ = reply.send(result);
                    }
                    Some(SessionCommand::Stop { reply }) => {
                        self.stop().await;
                        let _ = reply.send(self.stats());
                    }
                    Some(SessionCommand::SetContext(context)) => self.set_context(context),
                    Some(SessionCommand::Shutdown) | None => {
                        self.stop().await;
                        break;
                    }
                },
                event = next_transport_event(&mut self.channel) => {
                    self.handle_transport_event(event).await;
                }
                Some(event) = self.playback_rx.recv() => {
                    self.handle_playback_event(event);
                }
            }
        }

        info!("Voice session task stopped");
    }

    /// Run the session on its own task and return a handle to it
    pub fn spawn(self) -> (SessionHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(32);
        let handle = SessionHandle {
            commands: tx,
            snapshots: self.state.watch(),
            changes: self.state.change_sender(),
            counters: self.counters.subscribe(),
        };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }
}

/// Next event of the open channel; pending forever without one
async fn next_transport_event(channel: &mut Option<LiveChannel>) -> TransportEvent {
    match channel {
        Some(channel) => channel.recv().await.unwrap_or(TransportEvent::Closed),
        None => std::future::pending().await,
    }
}

/// Cloneable control handle for a spawned [`VoiceSession`]
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    snapshots: watch::Receiver<StatusSnapshot>,
    changes: broadcast::Sender<StatusChange>,
    counters: watch::Receiver<SessionCounters>,
}

impl SessionHandle {
    pub async fn start(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Start { reply }).await?;
        rx.await.map_err(|_| stopped())?
    }

    pub async fn stop(&self) -> Result<SessionStats> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Stop { reply }).await?;
        rx.await.map_err(|_| stopped())
    }

    pub async fn set_context(&self, context: ExternalContext) -> Result<()> {
        self.send(SessionCommand::SetContext(context)).await
    }

    /// Statistics of the current (or last) session
    pub fn stats(&self) -> SessionStats {
        self.counters.borrow().snapshot()
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(SessionCommand::Shutdown).await
    }

    /// Latest status snapshot
    pub fn status(&self) -> StatusSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<StatusSnapshot> {
        self.snapshots.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.changes.subscribe()
    }

    async fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands.send(command).await.map_err(|_| stopped())
    }
}

fn stopped() -> VoiceError {
    VoiceError::Channel("session task is not running".into())
}
