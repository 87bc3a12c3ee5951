use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Inbound frame: `{"to": <receiver id>, "content": "..."}`.
pub use crate::message::SendMessageRequest as InboundFrame;

/// Outbound frame, tagged as `{"type": "message" | "error", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerFrame {
    Message(Message),
    Error(ErrorPayload),
}

impl ServerFrame {
    pub fn error(message: impl Into<String>) -> Self {
        ServerFrame::Error(ErrorPayload {
            error: message.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
}
