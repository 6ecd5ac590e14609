pub mod client;
pub mod messages;
pub mod transport;

pub use client::GeminiLiveTransport;
pub use messages::{
    FunctionCall, FunctionDeclaration, FunctionResponse, OutboundMessage, ServerMessage,
    SetupMessage,
};
pub use transport::{LiveChannel, LiveTransport, TransportEvent};
