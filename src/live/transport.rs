use tokio::sync::mpsc;

use super::messages::{OutboundMessage, ServerMessage, SetupMessage};
use crate::error::{Result, VoiceError};

/// Event delivered by the remote channel
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Inbound server message
    Message(ServerMessage),
    /// Mid-session channel failure
    Error(String),
    /// Remote side closed the channel
    Closed,
}

/// An established remote session
///
/// Outbound messages go through one unbounded queue, so send order equals
/// enqueue order and producers never wait on the network.
pub struct LiveChannel {
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    inbound: mpsc::Receiver<TransportEvent>,
}

impl LiveChannel {
    pub fn new(
        outbound: mpsc::UnboundedSender<OutboundMessage>,
        inbound: mpsc::Receiver<TransportEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }

    /// Queue a message for sending
    pub fn send(&self, message: OutboundMessage) -> Result<()> {
        self.outbound
            .send(message)
            .map_err(|_| VoiceError::Channel("outbound queue closed".into()))
    }

    /// Handle for producers that run outside the session (capture pump)
    pub fn sender(&self) -> mpsc::UnboundedSender<OutboundMessage> {
        self.outbound.clone()
    }

    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.inbound.recv().await
    }

    /// Ask the writer to close the connection
    pub fn close(self) {
        let _ = self.outbound.send(OutboundMessage::Close);
    }
}

/// Connects to the remote speech service
#[async_trait::async_trait]
pub trait LiveTransport: Send + Sync {
    /// Open a session and complete the handshake
    ///
    /// Resolves only once the remote peer acknowledged `setup`; any failure
    /// before that is `VoiceError::HandshakeFailed`.
    async fn connect(&self, setup: &SetupMessage) -> Result<LiveChannel>;

    fn name(&self) -> &str;
}
