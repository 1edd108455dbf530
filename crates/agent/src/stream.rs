//! Typed streaming events delivered to chat consumers.
//!
//! The gateway forwards these over SSE; the sequence always terminates with
//! either `complete` or `error`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events emitted during a streamed chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamEvent {
    /// The model has started producing a reply.
    MessageStart,

    /// Incremental text from the model.
    Token { text: String },

    /// The model requested a tool mid-stream.
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// The stream finished and both messages were persisted.
    Complete {
        user_message_id: Uuid,
        assistant_message_id: Uuid,
        tool_calls: usize,
    },

    /// Something failed mid-stream; the sequence ends here.
    Error { message: String },
}

impl ChatStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MessageStart => "message_start",
            Self::Token { .. } => "token",
            Self::ToolUse { .. } => "tool_use",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }
}
