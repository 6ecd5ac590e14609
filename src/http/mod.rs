//! HTTP API server for external control
//!
//! This module provides a REST API for controlling the voice session:
//! - GET /assistant/status - Status snapshot and session statistics
//! - POST /assistant/start - Start the voice session
//! - POST /assistant/stop - Stop the voice session
//! - PUT /assistant/context - Set the document context for the next session
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
