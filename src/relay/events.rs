//! Downstream SSE events

use bytes::Bytes;
use serde_json::json;

/// Media type of relay responses
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// One event sent to the web client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// `{"content": ...}`
    Content(String),
    /// `{"error": ...}`, terminal
    Error(String),
    /// `[DONE]`, terminal
    Done,
}

impl RelayEvent {
    /// Text after `data: `
    pub fn payload(&self) -> String {
        match self {
            RelayEvent::Content(content) => json!({ "content": content }).to_string(),
            RelayEvent::Error(message) => json!({ "error": message }).to_string(),
            RelayEvent::Done => "[DONE]".to_string(),
        }
    }

    /// Full SSE block, `data: <payload>\n\n`
    pub fn to_frame(&self) -> String {
        format!("data: {}\n\n", self.payload())
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.to_frame())
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RelayEvent::Content(_))
    }
}
