//! Live API websocket transport
//!
//! 1. **Connect** - open the websocket (API key in the query string)
//! 2. **Setup** - send the `setup` frame and wait for `setupComplete`
//! 3. **Stream** - a writer task drains the outbound queue in order, a
//!    reader task turns frames into [`TransportEvent`]s
//! 4. **Close** - `OutboundMessage::Close` sends a close frame
//!
//! The server may deliver JSON in binary frames, so any binary frame that
//! starts with `{` is parsed as a server message.

use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::messages::{OutboundMessage, ServerMessage, SetupMessage};
use super::transport::{LiveChannel, LiveTransport, TransportEvent};
use crate::config::LiveConfig;
use crate::error::{Result, VoiceError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct GeminiLiveTransport {
    endpoint: String,
    api_key: String,
    handshake_timeout: Duration,
}

impl GeminiLiveTransport {
    pub fn new(endpoint: String, api_key: String, handshake_timeout: Duration) -> Self {
        Self {
            endpoint,
            api_key,
            handshake_timeout,
        }
    }

    pub fn from_config(config: &LiveConfig, api_key: String) -> Self {
        Self::new(
            config.endpoint.clone(),
            api_key,
            Duration::from_secs(config.handshake_timeout_secs),
        )
    }
}

#[async_trait::async_trait]
impl LiveTransport for GeminiLiveTransport {
    async fn connect(&self, setup: &SetupMessage) -> Result<LiveChannel> {
        let connection_id = uuid::Uuid::new_v4().to_string();
        info!(
            connection_id = %connection_id,
            model = %setup.setup.model,
            "Connecting to Live API"
        );

        let url = format!("{}?key={}", self.endpoint, self.api_key);
        let (mut ws, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| VoiceError::HandshakeFailed(format!("websocket connect failed: {}", e)))?;

        let setup_json = serde_json::to_string(setup)
            .map_err(|e| VoiceError::HandshakeFailed(format!("failed to encode setup: {}", e)))?;
        ws.send(WsMessage::Text(setup_json.into()))
            .await
            .map_err(|e| VoiceError::HandshakeFailed(format!("failed to send setup: {}", e)))?;

        match tokio::time::timeout(self.handshake_timeout, wait_for_setup_complete(&mut ws)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(VoiceError::HandshakeFailed(format!(
                    "no setupComplete within {}s",
                    self.handshake_timeout.as_secs()
                )))
            }
        }

        info!(connection_id = %connection_id, "Live API setup complete");

        let (sink, stream) = ws.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(256);

        tokio::spawn(writer_loop(sink, outbound_rx, event_tx.clone(), connection_id.clone()));
        tokio::spawn(reader_loop(stream, event_tx, connection_id));

        Ok(LiveChannel::new(outbound_tx, event_rx))
    }

    fn name(&self) -> &str {
        "Gemini Live"
    }
}

/// JSON payload of a text frame, or of a binary frame carrying JSON
fn json_payload(msg: &WsMessage) -> Option<&str> {
    match msg {
        WsMessage::Text(text) => Some(text.as_str()),
        WsMessage::Binary(data) if data.first() == Some(&b'{') => std::str::from_utf8(data).ok(),
        _ => None,
    }
}

async fn wait_for_setup_complete(ws: &mut WsStream) -> Result<()> {
    while let Some(frame) = ws.next().await {
        let msg = frame.map_err(|e| {
            VoiceError::HandshakeFailed(format!("websocket error before setupComplete: {}", e))
        })?;

        if let WsMessage::Close(close) = &msg {
            return Err(VoiceError::HandshakeFailed(format!(
                "connection closed before setupComplete: {:?}",
                close
            )));
        }

        match json_payload(&msg).map(ServerMessage::parse) {
            Some(Ok(server)) if server.is_setup_complete() => return Ok(()),
            Some(Ok(_)) => debug!("Ignoring server message during setup"),
            Some(Err(e)) => warn!("Unparseable frame during setup: {}", e),
            None => debug!("Non-JSON frame during setup"),
        }
    }

    Err(VoiceError::HandshakeFailed("stream ended before setupComplete".into()))
}

async fn writer_loop(
    mut sink: SplitSink<WsStream, WsMessage>,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
    event_tx: mpsc::Sender<TransportEvent>,
    connection_id: String,
) {
    let mut audio_frames: u64 = 0;

    while let Some(message) = outbound_rx.recv().await {
        if let OutboundMessage::Audio(frame) = &message {
            audio_frames += 1;
            if audio_frames == 1 || audio_frames % 50 == 0 {
                debug!(
                    connection_id = %connection_id,
                    frames = audio_frames,
                    sequence = frame.sequence,
                    "Sending microphone audio"
                );
            }
        }

        let json = match message.to_json() {
            Ok(Some(json)) => json,
            Ok(None) => {
                info!(connection_id = %connection_id, "Closing Live API connection");
                let _ = sink.send(WsMessage::Close(None)).await;
                break;
            }
            Err(e) => {
                error!(connection_id = %connection_id, error = %e, "Failed to encode outbound message");
                continue;
            }
        };

        if let Err(e) = sink.send(WsMessage::Text(json.into())).await {
            warn!(connection_id = %connection_id, error = %e, "Websocket send failed");
            let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
            break;
        }
    }

    debug!(connection_id = %connection_id, "Writer loop terminated");
}

async fn reader_loop(
    mut stream: SplitStream<WsStream>,
    event_tx: mpsc::Sender<TransportEvent>,
    connection_id: String,
) {
    while let Some(frame) = stream.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                error!(connection_id = %connection_id, error = %e, "Websocket receive failed");
                let _ = event_tx.send(TransportEvent::Error(e.to_string())).await;
                return;
            }
        };

        if let WsMessage::Close(close) = &msg {
            info!(connection_id = %connection_id, reason = ?close, "Live API closed the connection");
            let _ = event_tx.send(TransportEvent::Closed).await;
            return;
        }

        match json_payload(&msg).map(ServerMessage::parse) {
            Some(Ok(server)) => {
                if event_tx.send(TransportEvent::Message(server)).await.is_err() {
                    debug!(connection_id = %connection_id, "Session dropped, stopping reader");
                    return;
                }
            }
            Some(Err(e)) => warn!(connection_id = %connection_id, error = %e, "Unparseable server message"),
            None => {}
        }
    }

    let _ = event_tx.send(TransportEvent::Closed).await;
}
