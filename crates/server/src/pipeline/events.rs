//! Typed events sent to the client over the stream channel.

use serde_json::{json, Value};

/// Message carried by every `error` event. The underlying cause is only logged.
pub const GENERIC_FAILURE_MESSAGE: &str = "Error processing request";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A fragment of the analysis stage.
    DeepThinking(String),
    /// A fragment of the response stage.
    FinalResponse(String),
    /// Generation failed; always the last event of its session.
    Error,
    /// Both stages completed; always the last event of its session.
    End,
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::DeepThinking(_) => "deep-thinking",
            SessionEvent::FinalResponse(_) => "final-response",
            SessionEvent::Error => "error",
            SessionEvent::End => "end",
        }
    }

    /// The `data:` payload: fragments are JSON-encoded strings, `end` is empty.
    pub fn payload(&self) -> String {
        match self {
            SessionEvent::DeepThinking(text) | SessionEvent::FinalResponse(text) => {
                Value::String(text.clone()).to_string()
            }
            SessionEvent::Error => json!({ "message": GENERIC_FAILURE_MESSAGE }).to_string(),
            SessionEvent::End => String::new(),
        }
    }

    /// Encode as one `text/event-stream` frame.
    ///
    /// Every frame carries at least one `data:` line; EventSource clients
    /// drop events without one.
    pub fn to_frame(&self) -> String {
        let payload = self.payload();
        let mut frame = format!("event: {}\n", self.name());
        for line in payload.split('\n') {
            frame.push_str("data: ");
            frame.push_str(line);
            frame.push('\n');
        }
        frame.push('\n');
        frame
    }
}
