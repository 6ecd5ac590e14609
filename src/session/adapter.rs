use tracing::debug;

use crate::live::messages::InlineData;
use crate::live::{FunctionCall, ServerMessage};

/// Work item extracted from one server message
#[derive(Debug, Clone)]
pub enum InboundAction {
    ToolCall(FunctionCall),
    Audio(InlineData),
    Interrupt,
    Transcript(String),
}

/// Split a server message into actions
///
/// A message may carry several parts at once; they are always handled as
/// tool calls, then audio, then interruption, then transcript.
pub fn route(message: ServerMessage) -> Vec<InboundAction> {
    let mut actions = Vec::new();

    if let Some(tool_call) = message.tool_call {
        actions.extend(tool_call.function_calls.into_iter().map(InboundAction::ToolCall));
    }

    if let Some(content) = message.server_content {
        if let Some(turn) = content.model_turn {
            actions.extend(
                turn.parts
                    .into_iter()
                    .filter_map(|part| part.inline_data)
                    .filter(InlineData::is_audio)
                    .map(InboundAction::Audio),
            );
        }

        if content.interrupted {
            actions.push(InboundAction::Interrupt);
        }

        if let Some(transcription) = content.input_transcription {
            actions.push(InboundAction::Transcript(transcription.text));
        }

        if content.turn_complete {
            debug!("Model turn complete");
        }
    }

    if let Some(go_away) = message.go_away {
        debug!("Server will disconnect soon (time left: {:?})", go_away.time_left);
    }

    actions
}
